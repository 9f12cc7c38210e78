use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Failure categories reported to the UI layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Transport,
    Filesystem,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Transport => "transport",
            ErrorKind::Filesystem => "filesystem",
        };
        f.write_str(label)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    /// The upgrade server answered with something that is not JSON.
    ///
    /// Version checks recover from this locally; it never reaches the UI.
    #[error("malformed server reply: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Transport(String),

    #[error("{action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The body ended before the advertised install file size was reached.
    #[error("download incomplete: received {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },

    #[error("server offered an unusable install file name: {0:?}")]
    InvalidFileName(String),
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Parse(_) => ErrorKind::Parse,
            UpdateError::Transport(_) | UpdateError::Incomplete { .. } => ErrorKind::Transport,
            UpdateError::Filesystem { .. } | UpdateError::InvalidFileName(_) => {
                ErrorKind::Filesystem
            }
        }
    }

    pub fn filesystem(action: &'static str, path: &Path, source: io::Error) -> Self {
        UpdateError::Filesystem {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::Transport(format!("request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_reported_kinds() {
        let parse = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        assert_eq!(UpdateError::from(parse).kind(), ErrorKind::Parse);
        assert_eq!(
            UpdateError::Transport("connection refused".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            UpdateError::Incomplete {
                received: 1,
                expected: 2
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            UpdateError::InvalidFileName(String::new()).kind(),
            ErrorKind::Filesystem
        );
    }

    #[test]
    fn filesystem_errors_name_the_path() {
        let err = UpdateError::filesystem(
            "failed to write",
            Path::new("/tmp/app/setup.exe"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(err.to_string(), "failed to write /tmp/app/setup.exe: denied");
    }
}
