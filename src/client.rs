//! Blocking HTTP transport for the OAuth and SDM endpoints.
//!
//! - Blocking client using `ureq` (no async).
//! - Two calls only: an empty-body POST (token refresh) and a bearer-authenticated GET.
//! - Any status other than 200 is an error carrying the status and response body.
//!   Responses are returned as untyped JSON; typed decoding happens in the pipeline.

use http::StatusCode;
use log::debug;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug)]
pub enum ClientError {
    Transport(String),
    Http {
        method: &'static str,
        status: StatusCode,
        message: String,
    },
    Json(serde_json::Error),
}

impl core::fmt::Display for ClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ClientError::Transport(s) => write!(f, "transport error: {}", s),
            ClientError::Http {
                method,
                status,
                message,
            } => write!(
                f,
                "{} failed with status code {}: {}",
                method,
                status.as_u16(),
                message
            ),
            ClientError::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        ClientError::Json(value)
    }
}

impl From<ureq::Error> for ClientError {
    fn from(value: ureq::Error) -> Self {
        ClientError::Transport(value.to_string())
    }
}

/// The two HTTP capabilities the ingestion pipeline consumes.
pub trait HttpTransport {
    /// POST with an empty body and a JSON content type.
    fn post_empty(&self, url: &str) -> Result<Value, ClientError>;

    /// GET with a JSON content type and `Authorization: Bearer <access_token>`.
    fn get_with_bearer(&self, url: &str, access_token: &str) -> Result<Value, ClientError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// `timeout` bounds each whole request; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        UreqTransport { agent: config.into() }
    }

    fn read_json(method: &'static str, mut resp: http::Response<ureq::Body>) -> Result<Value, ClientError> {
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        debug!("{} answered {} ({} bytes)", method, status.as_u16(), body.len());
        if status != StatusCode::OK {
            let message = if body.trim().is_empty() {
                String::from("<no body>")
            } else {
                body
            };
            return Err(ClientError::Http {
                method,
                status,
                message,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl HttpTransport for UreqTransport {
    fn post_empty(&self, url: &str) -> Result<Value, ClientError> {
        let resp = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .send_empty()?;
        Self::read_json("POST", resp)
    }

    fn get_with_bearer(&self, url: &str, access_token: &str) -> Result<Value, ClientError> {
        let resp = self
            .agent
            .get(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", access_token))
            .call()?;
        Self::read_json("GET", resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn post_sends_empty_json_request() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .match_header("content-type", "application/json")
            .match_body("")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"abc"}"#)
            .create();

        let transport = UreqTransport::new(Some(Duration::from_secs(5)));
        let body = transport
            .post_empty(&format!("{}/token?grant_type=refresh_token", server.url()))
            .expect("post succeeds");

        mock.assert();
        assert_eq!(body, json!({"access_token": "abc"}));
    }

    #[test]
    fn get_sets_bearer_header() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/enterprises/p/devices")
            .match_header("authorization", "Bearer tok-123")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"devices":[]}"#)
            .create();

        let transport = UreqTransport::new(None);
        let body = transport
            .get_with_bearer(&format!("{}/v1/enterprises/p/devices", server.url()), "tok-123")
            .expect("get succeeds");

        mock.assert();
        assert_eq!(body, json!({"devices": []}));
    }

    #[test]
    fn non_200_status_is_an_http_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .create();

        let transport = UreqTransport::new(None);
        let err = transport
            .get_with_bearer(&format!("{}/missing", server.url()), "tok")
            .unwrap_err();

        match &err {
            ClientError::Http { method, status, message } => {
                assert_eq!(*method, "GET");
                assert_eq!(*status, StatusCode::NOT_FOUND);
                assert_eq!(message, "not here");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "GET failed with status code 404: not here");
    }

    #[test]
    fn other_success_statuses_are_rejected() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/token").with_status(204).create();

        let transport = UreqTransport::new(None);
        let err = transport.post_empty(&format!("{}/token", server.url())).unwrap_err();

        assert!(matches!(&err, ClientError::Http { status, .. } if *status == StatusCode::NO_CONTENT));
        assert!(err.to_string().contains("<no body>"));
    }

    #[test]
    fn non_json_body_is_a_json_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create();

        let transport = UreqTransport::new(None);
        let err = transport.post_empty(&format!("{}/token", server.url())).unwrap_err();

        assert!(matches!(err, ClientError::Json(_)));
    }
}
