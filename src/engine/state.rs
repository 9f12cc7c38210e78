use std::fmt;
use std::path::PathBuf;

use crate::error::ErrorKind;

// Lifecycle of one update cycle. Terminal states are reported and then
// collapse back to Idle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable {
        version: u32,
        file: String,
        size: u64,
        notes: String,
    },
    Downloading {
        file: String,
        progress: Progress,
    },
    Completed {
        path: PathBuf,
    },
    Cancelled,
    Failed {
        kind: ErrorKind,
        detail: String,
    },
}

impl UpdateState {
    pub fn label(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up-to-date",
            UpdateState::UpdateAvailable { .. } => "update-available",
            UpdateState::Downloading { .. } => "downloading",
            UpdateState::Completed { .. } => "completed",
            UpdateState::Cancelled => "cancelled",
            UpdateState::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Percent(u8),
    /// The server did not say how large the install file is.
    Indeterminate { received: u64 },
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Percent(pct) => write!(f, "{pct}%"),
            Progress::Indeterminate { received } => write!(f, "{received} bytes"),
        }
    }
}

/// Notifications for the UI layer, in the order they happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    NoUpdate,
    UpdateAvailable {
        version: u32,
        notes: String,
        file_size: u64,
    },
    Progress(Progress),
    DownloadComplete {
        path: PathBuf,
    },
    DownloadCancelled,
    Error {
        kind: ErrorKind,
        detail: String,
    },
}

// Actions triggered by the user from the UI layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAction {
    CheckForUpdate,
    /// The download button: starts a download, or cancels the running one.
    Download,
    Cancel,
    Dismiss,
}
