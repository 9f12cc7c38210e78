use log::{debug, info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::engine::models::{VersionCheckRequest, VersionInfo};
use crate::error::UpdateError;
use crate::networking::UpgradeTransport;

pub mod download;

/// Ask the upgrade server which version is currently published.
///
/// One request, one reply, no retry. A reply that is not JSON yields
/// `Ok(None)`: it is logged and otherwise treated as "no result".
///
/// # Errors
/// Returns a transport error if the request itself fails.
pub async fn check_version<T>(
    transport: &T,
    app_id: i64,
    os: &str,
    client_id: Uuid,
    current_version: u32,
) -> Result<Option<VersionInfo>, UpdateError>
where
    T: UpgradeTransport + ?Sized,
{
    let request = VersionCheckRequest::new(app_id, os, client_id, current_version);
    let body = serde_json::to_vec(&request)?;
    info!(
        "version check: app {} on {} at version {}",
        app_id, os, current_version
    );

    let reply = transport.post(body).await?;
    debug!(
        "version check reply: {}",
        String::from_utf8_lossy(&reply)
    );
    match parse_version_info(&reply) {
        Ok(info) => {
            info!(
                "version check: server offers version {} ({:?}, {} bytes)",
                info.version, info.file, info.size
            );
            Ok(Some(info))
        }
        Err(err) => {
            warn!("version check: ignoring unparsable server reply: {err}");
            Ok(None)
        }
    }
}

/// Parse a version-check reply. Every field is optional and falls back to
/// zero or the empty string; only a body that is not JSON at all fails.
pub fn parse_version_info(body: &[u8]) -> Result<VersionInfo, UpdateError> {
    let value: Value = serde_json::from_slice(body)?;
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    Ok(VersionInfo {
        version: u32::try_from(int_field(obj, "version")).unwrap_or(0),
        file: str_field(obj, "file"),
        size: int_field(obj, "size"),
        notes: str_field(obj, "notes"),
    })
}

fn int_field(obj: &Map<String, Value>, key: &str) -> u64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .unwrap_or(0),
        _ => 0,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
