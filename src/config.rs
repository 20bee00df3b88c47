//! Runtime configuration: the request record plus transport settings.
//!
//! The request comes either from a JSON file shaped like the serverless event
//! (`{"projectId", "clientId", "clientSecret", "refreshToken"}`) or from `NEST_*`
//! environment variables. A dotenv file can pre-populate the environment.

use log::warn;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use crate::models::nest::Credentials;
use crate::services::ingest::Endpoints;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const ENV_PROJECT_ID: &str = "NEST_PROJECT_ID";
pub const ENV_CLIENT_ID: &str = "NEST_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "NEST_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "NEST_REFRESH_TOKEN";

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    /// Per-request timeout handed to the transport; `None` disables it.
    pub http_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env(request_file: Option<&Path>) -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok(), request_file)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, request_file: Option<&Path>) -> Result<Self, String> {
        let credentials = match request_file {
            Some(path) => read_request_file(path)?,
            None => Credentials {
                project_id: required(&lookup, ENV_PROJECT_ID)?,
                client_id: required(&lookup, ENV_CLIENT_ID)?,
                client_secret: required(&lookup, ENV_CLIENT_SECRET)?,
                refresh_token: required(&lookup, ENV_REFRESH_TOKEN)?,
            },
        };

        let timeout_secs = match lookup("NEST_HTTP_TIMEOUT_SECS") {
            Some(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<u64>()
                .map_err(|_| "NEST_HTTP_TIMEOUT_SECS must be a non-negative integer".to_string())?,
            _ => DEFAULT_HTTP_TIMEOUT_SECS,
        };
        let http_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let mut endpoints = Endpoints::default();
        if let Some(url) = lookup("NEST_TOKEN_URL").filter(|s| !s.trim().is_empty()) {
            endpoints.token_url = url.trim().to_string();
        }
        if let Some(url) = lookup("NEST_SDM_BASE_URL").filter(|s| !s.trim().is_empty()) {
            endpoints.sdm_base_url = url.trim().to_string();
        }

        Ok(Config {
            credentials,
            endpoints,
            http_timeout,
        })
    }
}

// Empty values are accepted; the API rejects them with a 4xx.
fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, String> {
    let value = lookup(key).ok_or_else(|| format!("Missing {key}: set it or pass --request <file>"))?;
    if value.is_empty() {
        warn!("{} is empty", key);
    }
    Ok(value)
}

fn read_request_file(path: &Path) -> Result<Credentials, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut de = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(&mut de)
        .map_err(|e| format!("invalid request in {} at `{}`: {}", path.display(), e.path(), e.inner()))
}

/// Apply a dotenv file to the process environment. Variables that are already set keep
/// their value. Returns the number of variables applied.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => format!("env file not found: {}", path.display()),
        _ => format!("failed to read {}: {}", path.display(), e),
    })?;
    let vars = parse_env_file(&content).map_err(|e| format!("{}:{}", path.display(), e))?;

    let mut applied = 0;
    for (key, value) in vars {
        if std::env::var_os(&key).is_none() {
            // Single-threaded at this point: logging and the transport are not set up yet.
            unsafe {
                std::env::set_var(&key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// Parse dotenv content into ordered assignments. Errors carry the 1-based line number.
fn parse_env_file(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut seen = HashMap::new();
    let mut vars: Vec<(String, String)> = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let Some((key, value)) = parse_env_line(line).map_err(|e| format!("{}: {}", index + 1, e))? else {
            continue;
        };
        // later assignments override earlier ones
        match seen.get(&key).copied() {
            Some(pos) => vars[pos] = (key, value),
            None => {
                seen.insert(key.clone(), vars.len());
                vars.push((key, value));
            }
        }
    }
    Ok(vars)
}

fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or("missing '=' in assignment")?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), unquote(raw.trim())?)))
}

fn unquote(raw: &str) -> Result<String, String> {
    let (quote, body) = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => (q, &raw[1..]),
        _ => {
            // unquoted: a leading `#` or one after a space starts a comment
            if raw.starts_with('#') {
                return Ok(String::new());
            }
            let value = match raw.find(" #") {
                Some(i) => &raw[..i],
                None => raw,
            };
            return Ok(value.trim_end().to_string());
        }
    };

    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();
    while let Some((i, ch)) = chars.next() {
        if ch == quote {
            let rest = body[i + 1..].trim();
            if rest.is_empty() || rest.starts_with('#') {
                return Ok(out);
            }
            return Err(format!("unexpected characters after closing {} quote", quote));
        }
        if ch == '\\' && quote == '"' {
            let escaped = match chars.next() {
                Some((_, 'n')) => '\n',
                Some((_, 't')) => '\t',
                Some((_, 'r')) => '\r',
                Some((_, other)) => other,
                None => return Err("unterminated escape sequence".to_string()),
            };
            out.push(escaped);
            continue;
        }
        out.push(ch);
    }
    Err(format!("unterminated {} quoted value", quote))
}
