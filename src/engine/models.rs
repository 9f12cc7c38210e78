use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Command codes understood by the upgrade endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    GetVersion,
    GetApp,
}

impl Command {
    pub fn code(self) -> i32 {
        match self {
            Command::GetVersion => 1,
            Command::GetApp => 2,
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VersionCheckRequest {
    #[serde(rename = "appid")]
    pub app_id: i64,
    pub cmd: Command,
    pub os: String,
    #[serde(rename = "guid", serialize_with = "braced_uuid")]
    pub client_id: Uuid,
    pub version: u32,
}

impl VersionCheckRequest {
    pub fn new(app_id: i64, os: &str, client_id: Uuid, version: u32) -> Self {
        Self {
            app_id,
            cmd: Command::GetVersion,
            os: os.to_owned(),
            client_id,
            version,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DownloadRequest {
    #[serde(rename = "appid")]
    pub app_id: i64,
    pub cmd: Command,
    pub os: String,
}

impl DownloadRequest {
    pub fn new(app_id: i64, os: &str) -> Self {
        Self {
            app_id,
            cmd: Command::GetApp,
            os: os.to_owned(),
        }
    }
}

// Clients have always identified themselves with the braced form.
fn braced_uuid<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&id.braced())
}

/// What the server reports about the newest published build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: u32,
    pub file: String,
    pub size: u64,
    pub notes: String,
}

impl VersionInfo {
    pub fn is_newer_than(&self, current: u32) -> bool {
        self.version > current
    }

    /// Versions are published as hundredths: `200` reads as `2.00`.
    pub fn display_version(&self) -> String {
        format_version(self.version)
    }
}

pub fn format_version(version: u32) -> String {
    format!("{}.{:02}", version / 100, version % 100)
}

/// Install file offered by the last successful check and not yet dismissed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingInstall {
    pub version: u32,
    pub file: String,
    pub size: u64,
    pub notes: String,
}

impl From<VersionInfo> for PendingInstall {
    fn from(info: VersionInfo) -> Self {
        Self {
            version: info.version,
            file: info.file,
            size: info.size,
            notes: info.notes,
        }
    }
}
