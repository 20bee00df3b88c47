use crate::models::nest::DeviceId;

/// Extract the device id from a resource path such as `enterprises/{project}/devices/{id}`.
///
/// The id is the final `/`-separated segment; a name without separators is its own id.
pub fn device_id_from_name(name: &str) -> DeviceId {
    let id = name.rsplit('/').next().unwrap_or(name);
    DeviceId(id.to_string())
}

/// Mask a credential for log output, keeping only a short prefix.
pub fn redact(secret: &str) -> String {
    const VISIBLE: usize = 4;
    let count = secret.chars().count();
    if count <= VISIBLE * 2 {
        return format!("<redacted, {} chars>", count);
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    format!("{}...<redacted, {} chars>", prefix, count)
}
