use std::env;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::UpdateError;

/// Operating-system tag sent to the upgrade server.
pub fn os_tag() -> &'static str {
    match env::consts::OS {
        "windows" => "win32",
        "macos" => "osx",
        _ => "linux",
    }
}

/// Returns the platform downloads directory, falling back to `~/Downloads`.
pub fn downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory the installers of `app_name` are downloaded into.
pub fn app_download_dir(downloads_dir: &Path, app_name: &str) -> PathBuf {
    downloads_dir.join(app_name)
}

/// Reduce a server-supplied file name to its final path component.
pub fn install_file_name(file: &str) -> Result<String, UpdateError> {
    Path::new(file.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| UpdateError::InvalidFileName(file.to_owned()))
}

/// Path the install file is written to. Pure; no directories are touched.
pub fn destination_path(
    downloads_dir: &Path,
    app_name: &str,
    file: &str,
) -> Result<PathBuf, UpdateError> {
    let name = install_file_name(file)?;
    Ok(app_download_dir(downloads_dir, app_name).join(name))
}

/// Like [`destination_path`], creating the application subdirectory if absent.
pub async fn prepare_destination(
    downloads_dir: &Path,
    app_name: &str,
    file: &str,
) -> Result<PathBuf, UpdateError> {
    let dest = destination_path(downloads_dir, app_name, file)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| UpdateError::filesystem("failed to create download dir", parent, e))?;
    }
    Ok(dest)
}
