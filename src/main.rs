pub mod models {
    pub mod nest;
}

pub mod client;
pub mod config;
pub mod utils;
pub mod services {
    pub mod ingest;
}

use crate::client::UreqTransport;
use crate::config::Config;
use crate::services::ingest;
use log::{error, info};
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    request_file: Option<PathBuf>,
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

fn run(args: &CliArgs) -> Result<(), String> {
    // 1) Load config (request record + transport settings)
    let cfg = Config::from_env(args.request_file.as_deref())?;
    info!(
        "Config loaded (project={}, http_timeout={}, token_url={}, sdm_base_url={})",
        cfg.credentials.project_id,
        cfg.http_timeout
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "-".to_string()),
        cfg.endpoints.token_url,
        cfg.endpoints.sdm_base_url,
    );

    // 2) Refresh token, resolve thermostat, fetch reading
    let transport = UreqTransport::new(cfg.http_timeout);
    let message = ingest::handle_request(&transport, &cfg.endpoints, &cfg.credentials).map_err(|e| e.to_string())?;

    // 3) Hand the result to the caller
    println!("{}", message);
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = std::ffi::OsString>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let slot = match flag.as_str() {
            "--env-file" => &mut parsed.env_file,
            "--request" => &mut parsed.request_file,
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        };
        if slot.is_some() {
            return Err(format!("`{}` provided more than once", flag));
        }
        let value = match inline {
            Some(v) => v,
            None => args
                .next()
                .and_then(|v| v.into_string().ok())
                .ok_or_else(|| format!("`{}` requires a path argument", flag))?,
        };
        if value.is_empty() {
            return Err(format!("`{}` requires a path argument", flag));
        }
        *slot = Some(PathBuf::from(value));
    }

    Ok(parsed)
}

fn load_env(args: &CliArgs) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = &args.env_file {
        let applied = config::load_env_file(path)?;
        return Ok(Some(LoadedEnvFile {
            path: path.clone(),
            explicit: true,
            applied,
        }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    let applied = config::load_env_file(&default_path)?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
        applied,
    }))
}

fn main() {
    let args = match parse_args(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };
    let loaded_env = match load_env(&args) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "nest-ingest {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&args) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn parses_both_flag_forms() {
        let parsed = parse_args(args(&["--env-file", "prod.env", "--request=event.json"])).unwrap();
        assert_eq!(
            parsed,
            CliArgs {
                env_file: Some(PathBuf::from("prod.env")),
                request_file: Some(PathBuf::from("event.json")),
            }
        );
        assert_eq!(parse_args(args(&[])).unwrap(), CliArgs::default());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(args(&["--verbose"])).unwrap_err().contains("unrecognised"));
        assert!(parse_args(args(&["--request"])).unwrap_err().contains("requires a path"));
        assert!(parse_args(args(&["--env-file="])).unwrap_err().contains("requires a path"));
        assert!(
            parse_args(args(&["--request", "a.json", "--request", "b.json"]))
                .unwrap_err()
                .contains("more than once")
        );
    }

    #[test]
    fn stops_at_double_dash() {
        let parsed = parse_args(args(&["--request", "a.json", "--", "--ignored"])).unwrap();
        assert_eq!(parsed.request_file, Some(PathBuf::from("a.json")));
    }
}
