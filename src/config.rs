use std::path::PathBuf;

use uuid::Uuid;

use crate::env;
use crate::networking::UPGRADE_ENDPOINT;

/// Everything the updater needs to know about the application it serves.
#[derive(Clone, Debug)]
pub struct UpdaterConfig {
    pub app_name: String,
    pub app_id: i64,
    pub current_version: u32,
    pub endpoint: String,
    pub os_tag: String,
    pub client_id: Uuid,
    pub downloads_dir: PathBuf,
}

impl UpdaterConfig {
    /// Defaults for everything but the application identity: the public
    /// endpoint, this platform's OS tag and downloads directory, and a fresh
    /// client identifier.
    pub fn new(app_name: impl Into<String>, app_id: i64, current_version: u32) -> Self {
        Self {
            app_name: app_name.into(),
            app_id,
            current_version,
            endpoint: UPGRADE_ENDPOINT.to_owned(),
            os_tag: env::os_tag().to_owned(),
            client_id: Uuid::new_v4(),
            downloads_dir: env::downloads_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_platform_defaults() {
        let config = UpdaterConfig::new("Viewer", 42, 150);
        assert_eq!(config.endpoint, UPGRADE_ENDPOINT);
        assert_eq!(config.os_tag, env::os_tag());
        assert!(!config.client_id.is_nil());
        assert_ne!(UpdaterConfig::new("Viewer", 42, 150).client_id, config.client_id);
    }
}
