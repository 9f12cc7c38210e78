use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

mod config;
mod engine;
mod env;
mod error;
mod networking;
#[cfg(test)]
mod test_support;
mod ui;
mod updater;
mod util;

use crate::config::UpdaterConfig;
use crate::engine::UpdateController;
use crate::engine::models::format_version;
use crate::engine::state::{UpdateEvent, UpdateState, UserAction};
use crate::networking::{NetworkClient, UPGRADE_ENDPOINT};
use crate::ui::TerminalUi;

#[derive(Parser, Debug)]
#[command(
    name = "app-updater",
    author,
    version,
    about = "Checks for a newer release of an application and downloads its installer"
)]
struct Cli {
    /// Application name; installers are saved under <downloads>/<name>/.
    #[arg(long, env = "UPDATER_APP_NAME")]
    app_name: String,

    /// Numeric application id registered with the upgrade server.
    #[arg(long, env = "UPDATER_APP_ID")]
    app_id: i64,

    /// Installed version, in hundredths (150 is 1.50).
    #[arg(long, env = "UPDATER_CURRENT_VERSION")]
    current_version: u32,

    #[arg(long, env = "UPDATER_ENDPOINT", default_value = UPGRADE_ENDPOINT)]
    endpoint: String,

    /// Override the operating-system tag sent to the server.
    #[arg(long = "os", env = "UPDATER_OS")]
    os_tag: Option<String>,

    /// Client instance identifier; a fresh one is generated when omitted.
    #[arg(long, env = "UPDATER_CLIENT_ID")]
    client_id: Option<Uuid>,

    /// Directory the application subdirectory is created in.
    #[arg(long, env = "UPDATER_DOWNLOADS_DIR")]
    downloads_dir: Option<PathBuf>,

    /// Answer yes to every question.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Report whether an update exists without downloading it.
    #[arg(long)]
    check_only: bool,
}

impl Cli {
    fn to_config(&self) -> UpdaterConfig {
        let mut config =
            UpdaterConfig::new(self.app_name.clone(), self.app_id, self.current_version);
        config.endpoint = self.endpoint.clone();
        if let Some(os) = &self.os_tag {
            config.os_tag = os.clone();
        }
        if let Some(id) = self.client_id {
            config.client_id = id;
        }
        if let Some(dir) = &self.downloads_dir {
            config.downloads_dir = dir.clone();
        }
        config
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let runtime = ui::build_runtime();
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let config = cli.to_config();
    info!(
        "{} {} (app {}, os {}, client {})",
        config.app_name,
        format_version(config.current_version),
        config.app_id,
        config.os_tag,
        config.client_id
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = NetworkClient::new(config.endpoint.clone());
    let controller = Arc::new(UpdateController::new(config, transport, tx));
    let mut ui = TerminalUi::new(cli.yes);

    // Ctrl-C cancels a running download, otherwise quits.
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                let state = controller.handle_action(UserAction::Cancel).await;
                if !matches!(state, UpdateState::Downloading { .. }) {
                    std::process::exit(130);
                }
            }
        });
    }

    let state = controller.handle_action(UserAction::CheckForUpdate).await;
    let mut failed = false;
    while let Ok(event) = rx.try_recv() {
        failed |= matches!(event, UpdateEvent::Error { .. });
        ui.render(&event);
    }
    if failed {
        return ExitCode::FAILURE;
    }

    if !matches!(state, UpdateState::UpdateAvailable { .. }) || cli.check_only {
        return ExitCode::SUCCESS;
    }
    if !ui.confirm("Download in background?").await {
        controller.handle_action(UserAction::Dismiss).await;
        return ExitCode::SUCCESS;
    }
    if let Some(dest) = controller.destination_path() {
        info!("saving installer to {}", dest.display());
    }

    let download = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.handle_action(UserAction::Download).await })
    };
    let mut last = None;
    while let Some(event) = rx.recv().await {
        if ui.render(&event) {
            last = Some(event);
            break;
        }
    }
    match download.await {
        Ok(state) => info!("updater settled in state {}", state.label()),
        Err(err) => {
            warn!("download task ended abnormally: {err}");
            return ExitCode::FAILURE;
        }
    }

    match last {
        Some(UpdateEvent::DownloadComplete { path }) => {
            if ui.confirm("Do you want to upgrade now?").await
                && let Err(err) = ui::launch_installer(&path)
            {
                warn!("{err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Some(UpdateEvent::DownloadCancelled) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_reach_the_config() {
        let cli = Cli::try_parse_from([
            "app-updater",
            "--app-name",
            "Viewer",
            "--app-id",
            "42",
            "--current-version",
            "150",
            "--os",
            "win32",
            "--client-id",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--downloads-dir",
            "/tmp/dl",
            "--endpoint",
            "http://localhost:8080/upgrade.php",
        ])
        .unwrap();
        let config = cli.to_config();

        assert_eq!(config.app_name, "Viewer");
        assert_eq!(config.app_id, 42);
        assert_eq!(config.current_version, 150);
        assert_eq!(config.os_tag, "win32");
        assert_eq!(
            config.client_id.to_string(),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
        assert_eq!(config.downloads_dir, PathBuf::from("/tmp/dl"));
        assert_eq!(config.endpoint, "http://localhost:8080/upgrade.php");
        assert!(!cli.yes);
    }

    #[test]
    fn app_identity_is_required() {
        assert!(Cli::try_parse_from(["app-updater", "--app-name", "Viewer"]).is_err());
    }
}
