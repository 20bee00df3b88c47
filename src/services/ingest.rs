//! Thermostat ingestion: refresh an access token, resolve the project's thermostat,
//! fetch its traits and flatten them into a [`ThermostatReading`].
//!
//! Every step needs the previous step's output, so calls are strictly sequential.
//! The first failure aborts the run and is returned as-is.

use chrono::Utc;
use core::fmt;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::client::{ClientError, HttpTransport};
use crate::models::nest::{
    AccessToken, Credentials, DeviceDetail, DeviceId, DevicesResponse, RefreshTokenResponse, ThermostatReading,
};
use crate::utils::{device_id_from_name, redact};

pub const GOOGLE_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";
pub const SDM_BASE_URL: &str = "https://smartdevicemanagement.googleapis.com/v1";

#[derive(Debug)]
pub enum IngestError {
    /// Transport or status failure, surfaced unchanged.
    Client(ClientError),
    /// A payload did not have the expected shape.
    Decode {
        payload: &'static str,
        path: String,
        source: serde_json::Error,
    },
    /// The project does not have exactly one thermostat.
    Cardinality(usize),
    /// The token endpoint URL could not be assembled.
    Url(url::ParseError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Client(e) => write!(f, "{}", e),
            IngestError::Decode { payload, path, source } => {
                write!(f, "failed to decode {} at `{}`: {}", payload, path, source)
            }
            IngestError::Cardinality(n) => write!(f, "Expected one device. Found {}.", n),
            IngestError::Url(e) => write!(f, "invalid token endpoint url: {}", e),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Client(e) => Some(e),
            IngestError::Decode { source, .. } => Some(source),
            IngestError::Url(e) => Some(e),
            IngestError::Cardinality(_) => None,
        }
    }
}

impl From<ClientError> for IngestError {
    fn from(value: ClientError) -> Self {
        IngestError::Client(value)
    }
}

impl From<url::ParseError> for IngestError {
    fn from(value: url::ParseError) -> Self {
        IngestError::Url(value)
    }
}

/// Upstream endpoint locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token_url: String,
    pub sdm_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            token_url: GOOGLE_TOKEN_URL.to_string(),
            sdm_base_url: SDM_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Token endpoint with the credentials as percent-encoded query parameters.
    pub fn token_refresh_url(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<url::Url, IngestError> {
        let url = url::Url::parse_with_params(
            &self.token_url,
            &[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )?;
        Ok(url)
    }

    pub fn devices_url(&self, project_id: &str) -> String {
        format!("{}/enterprises/{}/devices", self.base(), project_id)
    }

    pub fn device_url(&self, project_id: &str, device_id: &DeviceId) -> String {
        format!("{}/enterprises/{}/devices/{}", self.base(), project_id, device_id)
    }

    fn base(&self) -> &str {
        self.sdm_base_url.trim_end_matches('/')
    }
}

fn decode<T: DeserializeOwned>(payload: &'static str, body: Value) -> Result<T, IngestError> {
    serde_path_to_error::deserialize(body).map_err(|e| IngestError::Decode {
        payload,
        path: e.path().to_string(),
        source: e.into_inner(),
    })
}

/// Exchange a refresh token for a short-lived access token.
pub fn refresh_access_token(
    transport: &impl HttpTransport,
    endpoints: &Endpoints,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<AccessToken, IngestError> {
    let url = endpoints.token_refresh_url(client_id, client_secret, refresh_token)?;
    debug!(
        "Refreshing access token at {} (client_id={}, refresh_token={})",
        endpoints.token_url,
        client_id,
        redact(refresh_token)
    );
    let body = transport.post_empty(url.as_str())?;
    let resp: RefreshTokenResponse = decode("token response", body)?;
    debug!(
        "Token response: type={}, scope={}, expires_in={}",
        resp.token_type.as_deref().unwrap_or("-"),
        resp.scope.as_deref().unwrap_or("-"),
        resp.expires_in.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
    );
    Ok(AccessToken::from_response(resp, Utc::now()))
}

/// Resolve the id of the single thermostat in the project.
pub fn resolve_thermostat_id(
    transport: &impl HttpTransport,
    endpoints: &Endpoints,
    project_id: &str,
    access_token: &AccessToken,
) -> Result<DeviceId, IngestError> {
    let url = endpoints.devices_url(project_id);
    debug!("Listing devices: {}", url);
    let body = transport.get_with_bearer(&url, &access_token.value)?;
    let resp: DevicesResponse = decode("device list", body)?;

    let total = resp.devices.len();
    let mut ids = resp
        .devices
        .iter()
        .filter(|d| d.is_thermostat())
        .map(|d| device_id_from_name(&d.name))
        .collect::<Vec<_>>();
    debug!("Project {} lists {} device(s), {} thermostat(s)", project_id, total, ids.len());

    match ids.len() {
        1 => Ok(ids.remove(0)),
        n => Err(IngestError::Cardinality(n)),
    }
}

/// Fetch the device's traits and flatten them into a reading.
pub fn fetch_thermostat_reading(
    transport: &impl HttpTransport,
    endpoints: &Endpoints,
    project_id: &str,
    device_id: &DeviceId,
    access_token: &AccessToken,
) -> Result<ThermostatReading, IngestError> {
    let url = endpoints.device_url(project_id, device_id);
    debug!("Fetching device: {}", url);
    let body = transport.get_with_bearer(&url, &access_token.value)?;
    let detail: DeviceDetail = decode("device detail", body)?;
    debug!("Decoded traits of {} ({})", detail.name, detail.device_type);
    Ok(ThermostatReading::from(&detail.traits))
}

/// Run the full pipeline for one request and render the result.
pub fn handle_request(
    transport: &impl HttpTransport,
    endpoints: &Endpoints,
    credentials: &Credentials,
) -> Result<String, IngestError> {
    let token = refresh_access_token(
        transport,
        endpoints,
        &credentials.client_id,
        &credentials.client_secret,
        &credentials.refresh_token,
    )?;
    match token.expires_at {
        Some(t) => info!("Access token refreshed ({}), expires at {}", redact(&token.value), t),
        None => info!("Access token refreshed ({})", redact(&token.value)),
    }

    let device_id = resolve_thermostat_id(transport, endpoints, &credentials.project_id, &token)?;
    info!("Device Id: {}", device_id);

    let reading = fetch_thermostat_reading(transport, endpoints, &credentials.project_id, &device_id, &token)?;
    info!("Fetched reading for device {}", device_id);

    Ok(format!("Thermostat Reading: {}", reading))
}
