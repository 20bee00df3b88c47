//! Models for the Smart Device Management (SDM) API and the Google OAuth token endpoint.
//!
//! Scope: types only, no HTTP code.
//!
//! Notes
//! - Upstream payloads are decoded strictly: every field a reading depends on is required,
//!   unknown keys are ignored.
//! - Trait objects are keyed by namespaced identifiers (`sdm.devices.traits.*`); the
//!   `rename` attributes on [`Traits`] are the complete alias table.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

use crate::utils::redact;

/// Device type marker of thermostats in the device list.
pub const THERMOSTAT_DEVICE_TYPE: &str = "sdm.devices.types.THERMOSTAT";

// =====================
// Inbound request
// =====================

/// Per-invocation request: the project to read and the OAuth client credentials.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub project_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

// =====================
// OAuth
// =====================

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Short-lived bearer credential, valid for the current invocation only.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn from_response(resp: RefreshTokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = resp
            .expires_in
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| now.checked_add_signed(d));
        AccessToken {
            value: resp.access_token,
            expires_at,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &redact(&self.value))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =====================
// Devices
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DevicesResponse {
    // An enterprise without devices answers with `{}`.
    #[serde(default)]
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDeviceSummary")]
pub struct DeviceSummary {
    /// Fully qualified resource path, `enterprises/{project}/devices/{id}`.
    pub name: String,
    pub device_type: String,
}

// The API sends `type`; older payloads carry `deviceType`. `type` wins when both are present.
#[derive(Deserialize)]
struct RawDeviceSummary {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "deviceType", default)]
    legacy_kind: Option<String>,
}

impl TryFrom<RawDeviceSummary> for DeviceSummary {
    type Error = String;

    fn try_from(raw: RawDeviceSummary) -> Result<Self, Self::Error> {
        let device_type = raw
            .kind
            .or(raw.legacy_kind)
            .ok_or_else(|| format!("missing field `type` for device {}", raw.name))?;
        Ok(DeviceSummary {
            name: raw.name,
            device_type,
        })
    }
}

impl DeviceSummary {
    pub fn is_thermostat(&self) -> bool {
        self.device_type == THERMOSTAT_DEVICE_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub traits: Traits,
}

// =====================
// Traits
// =====================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Traits {
    #[serde(rename = "sdm.devices.traits.Humidity")]
    pub humidity: HumidityTrait,
    #[serde(rename = "sdm.devices.traits.Fan")]
    pub fan: FanTrait,
    #[serde(rename = "sdm.devices.traits.ThermostatMode")]
    pub thermostat_mode: ThermostatModeTrait,
    #[serde(rename = "sdm.devices.traits.ThermostatHvac")]
    pub hvac_status: ThermostatHvacTrait,
    #[serde(rename = "sdm.devices.traits.ThermostatTemperatureSetpoint")]
    pub thermostat_temperature_setpoint: TemperatureSetpointTrait,
    #[serde(rename = "sdm.devices.traits.Temperature")]
    pub temperature: TemperatureTrait,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumidityTrait {
    pub ambient_humidity_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanTrait {
    pub timer_mode: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThermostatModeTrait {
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThermostatHvacTrait {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureSetpointTrait {
    pub heat_celsius: f64,
    pub cool_celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureTrait {
    pub ambient_temperature_celsius: f64,
}

// =====================
// Outbound reading
// =====================

/// Flattened thermostat state. Values are copied from the traits as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatReading {
    pub temp: f64,
    pub humidity: u32,
    pub heat_setpoint_celsius: f64,
    pub cool_setpoint_celsius: f64,
    pub thermostat_mode: String,
    pub fan_timer_mode: String,
    pub hvac_status: String,
}

impl From<&Traits> for ThermostatReading {
    fn from(traits: &Traits) -> Self {
        ThermostatReading {
            temp: traits.temperature.ambient_temperature_celsius,
            humidity: traits.humidity.ambient_humidity_percent,
            heat_setpoint_celsius: traits.thermostat_temperature_setpoint.heat_celsius,
            cool_setpoint_celsius: traits.thermostat_temperature_setpoint.cool_celsius,
            thermostat_mode: traits.thermostat_mode.mode.clone(),
            fan_timer_mode: traits.fan.timer_mode.clone(),
            hvac_status: traits.hvac_status.status.clone(),
        }
    }
}

impl fmt::Display for ThermostatReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "temp={} humidity={} heat_setpoint_celsius={} cool_setpoint_celsius={} thermostat_mode={} fan_timer_mode={} hvac_status={}",
            self.temp,
            self.humidity,
            self.heat_setpoint_celsius,
            self.cool_setpoint_celsius,
            self.thermostat_mode,
            self.fan_timer_mode,
            self.hvac_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn load_device_fixture() -> serde_json::Value {
        let json = std::fs::read_to_string("tests/data/device.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse device fixture")
    }

    #[test]
    fn flattens_device_fixture_without_conversion() {
        let detail: DeviceDetail = serde_json::from_value(load_device_fixture()).expect("decode device");
        assert_eq!(detail.device_type, THERMOSTAT_DEVICE_TYPE);

        let reading = ThermostatReading::from(&detail.traits);
        assert_eq!(
            reading,
            ThermostatReading {
                temp: 19.119995,
                humidity: 49,
                heat_setpoint_celsius: 19.152817,
                cool_setpoint_celsius: 23.333328,
                thermostat_mode: "HEATCOOL".into(),
                fan_timer_mode: "OFF".into(),
                hvac_status: "OFF".into(),
            }
        );
    }

    #[test]
    fn missing_any_required_trait_fails_decode() {
        let keys = [
            "sdm.devices.traits.Humidity",
            "sdm.devices.traits.Fan",
            "sdm.devices.traits.ThermostatMode",
            "sdm.devices.traits.ThermostatHvac",
            "sdm.devices.traits.ThermostatTemperatureSetpoint",
            "sdm.devices.traits.Temperature",
        ];
        for key in keys {
            let mut body = load_device_fixture();
            body["traits"].as_object_mut().expect("traits object").remove(key);
            let err = serde_json::from_value::<DeviceDetail>(body).expect_err("decode must fail");
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn mistyped_trait_field_fails_decode() {
        let mut body = load_device_fixture();
        body["traits"]["sdm.devices.traits.Humidity"]["ambientHumidityPercent"] = json!("49");
        assert!(serde_json::from_value::<DeviceDetail>(body).is_err());
    }

    #[test]
    fn device_summary_accepts_both_type_keys() {
        let a: DeviceSummary = serde_json::from_value(json!({
            "name": "enterprises/p/devices/a",
            "type": THERMOSTAT_DEVICE_TYPE,
        }))
        .unwrap();
        let b: DeviceSummary = serde_json::from_value(json!({
            "name": "enterprises/p/devices/b",
            "deviceType": "sdm.devices.types.CAMERA",
        }))
        .unwrap();
        assert!(a.is_thermostat());
        assert!(!b.is_thermostat());
    }

    #[test]
    fn device_summary_with_both_type_keys_prefers_type() {
        let d: DeviceSummary = serde_json::from_value(json!({
            "name": "enterprises/p/devices/a",
            "deviceType": "sdm.devices.types.CAMERA",
            "type": THERMOSTAT_DEVICE_TYPE,
        }))
        .expect("both keys decode");
        assert_eq!(d.device_type, THERMOSTAT_DEVICE_TYPE);
    }

    #[test]
    fn device_summary_without_type_fails_decode() {
        let err = serde_json::from_value::<DeviceSummary>(json!({"name": "enterprises/p/devices/a"})).unwrap_err();
        assert!(err.to_string().contains("missing field `type`"), "{err}");
    }

    #[test]
    fn empty_device_list_body_decodes_to_no_devices() {
        let resp: DevicesResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.devices.is_empty());
    }

    #[test]
    fn access_token_expiry_is_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let resp: RefreshTokenResponse = serde_json::from_value(json!({
            "access_token": "ya29.abc",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/sdm.service",
            "token_type": "Bearer",
        }))
        .unwrap();
        let token = AccessToken::from_response(resp, now);
        assert_eq!(token.value, "ya29.abc");
        assert_eq!(token.expires_at, Some(now + chrono::Duration::seconds(3599)));
    }

    #[test]
    fn refresh_response_requires_access_token() {
        let err = serde_json::from_value::<RefreshTokenResponse>(json!({"expires_in": 10})).unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds: Credentials = serde_json::from_value(json!({
            "projectId": "123-456",
            "clientId": "client.apps.googleusercontent.com",
            "clientSecret": "GOCSPX-supersecretvalue",
            "refreshToken": "1//0gLongRefreshTokenValue",
        }))
        .unwrap();
        let shown = format!("{creds:?}");
        assert!(shown.contains("123-456"));
        assert!(!shown.contains("supersecretvalue"));
        assert!(!shown.contains("LongRefreshTokenValue"));
    }

    #[test]
    fn reading_renders_all_fields_unrounded() {
        let reading = ThermostatReading {
            temp: 19.119995,
            humidity: 49,
            heat_setpoint_celsius: 19.152817,
            cool_setpoint_celsius: 23.333328,
            thermostat_mode: "HEATCOOL".into(),
            fan_timer_mode: "OFF".into(),
            hvac_status: "OFF".into(),
        };
        assert_eq!(
            reading.to_string(),
            "temp=19.119995 humidity=49 heat_setpoint_celsius=19.152817 cool_setpoint_celsius=23.333328 thermostat_mode=HEATCOOL fan_timer_mode=OFF hvac_status=OFF"
        );
    }
}
