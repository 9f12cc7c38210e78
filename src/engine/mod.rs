use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::config::UpdaterConfig;
use crate::engine::models::{PendingInstall, format_version};
use crate::engine::state::{Progress, UpdateEvent, UpdateState, UserAction};
use crate::env;
use crate::error::{ErrorKind, UpdateError};
use crate::networking::UpgradeTransport;
use crate::updater;
use crate::updater::download::{DownloadOutcome, DownloadSession};
use crate::util::CancelToken;

pub mod models;
pub mod state;

/// The UI side of the updater. Callbacks run on the task that drives the
/// controller and must not block.
pub trait UpdateListener: Send + Sync {
    fn on_no_update(&self);
    fn on_update_available(&self, version: u32, notes: &str, file_size: u64);
    fn on_progress(&self, progress: Progress);
    fn on_download_complete(&self, path: &Path);
    fn on_download_cancelled(&self);
    fn on_error(&self, kind: ErrorKind, detail: &str);

    fn on_state_changed(&self, _state: &UpdateState) {}
}

impl UpdateListener for mpsc::UnboundedSender<UpdateEvent> {
    fn on_no_update(&self) {
        let _ = self.send(UpdateEvent::NoUpdate);
    }

    fn on_update_available(&self, version: u32, notes: &str, file_size: u64) {
        let _ = self.send(UpdateEvent::UpdateAvailable {
            version,
            notes: notes.to_owned(),
            file_size,
        });
    }

    fn on_progress(&self, progress: Progress) {
        let _ = self.send(UpdateEvent::Progress(progress));
    }

    fn on_download_complete(&self, path: &Path) {
        let _ = self.send(UpdateEvent::DownloadComplete {
            path: path.to_path_buf(),
        });
    }

    fn on_download_cancelled(&self) {
        let _ = self.send(UpdateEvent::DownloadCancelled);
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        let _ = self.send(UpdateEvent::Error {
            kind,
            detail: detail.to_owned(),
        });
    }
}

struct Inner {
    state: UpdateState,
    pending: Option<PendingInstall>,
    cancel: Option<CancelToken>,
}

/// Drives one update cycle at a time: version check, then at most one
/// download.
///
/// Methods take `&self` so the UI can cancel while a check or download is
/// awaiting the network.
pub struct UpdateController<T, L> {
    config: UpdaterConfig,
    transport: T,
    listener: L,
    inner: Mutex<Inner>,
}

impl<T, L> UpdateController<T, L>
where
    T: UpgradeTransport,
    L: UpdateListener,
{
    pub fn new(config: UpdaterConfig, transport: T, listener: L) -> Self {
        Self {
            config,
            transport,
            listener,
            inner: Mutex::new(Inner {
                state: UpdateState::Idle,
                pending: None,
                cancel: None,
            }),
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn state(&self) -> UpdateState {
        self.lock().state.clone()
    }

    /// The install file offered by the last check, if it was not dismissed.
    pub fn pending(&self) -> Option<PendingInstall> {
        self.lock().pending.clone()
    }

    /// Where the pending install file is (or will be) written.
    pub fn destination_path(&self) -> Option<PathBuf> {
        let pending = self.pending()?;
        env::destination_path(
            &self.config.downloads_dir,
            &self.config.app_name,
            &pending.file,
        )
        .ok()
    }

    pub async fn handle_action(&self, action: UserAction) -> UpdateState {
        debug!("action: {action:?}");
        match action {
            UserAction::CheckForUpdate => self.check_for_update().await,
            UserAction::Download => self.start_download().await,
            UserAction::Cancel => {
                self.cancel();
                self.state()
            }
            UserAction::Dismiss => {
                self.dismiss();
                self.state()
            }
        }
    }

    /// Ask the server for the latest version. Only valid from Idle.
    ///
    /// Returns the state the cycle settled in: `UpdateAvailable` when a newer
    /// version is offered, otherwise `Idle`.
    pub async fn check_for_update(&self) -> UpdateState {
        {
            let mut inner = self.lock();
            if inner.state != UpdateState::Idle {
                warn!(
                    "check_for_update: ignored while {}",
                    inner.state.label()
                );
                return inner.state.clone();
            }
            inner.state = UpdateState::Checking;
        }
        self.listener.on_state_changed(&UpdateState::Checking);
        info!("check_for_update: asking {}", self.config.endpoint);

        let result = updater::check_version(
            &self.transport,
            self.config.app_id,
            &self.config.os_tag,
            self.config.client_id,
            self.config.current_version,
        )
        .await;

        match result {
            Ok(Some(info)) if info.is_newer_than(self.config.current_version) => {
                info!(
                    "check_for_update: version {} available (current {})",
                    info.display_version(),
                    format_version(self.config.current_version)
                );
                let available = UpdateState::UpdateAvailable {
                    version: info.version,
                    file: info.file.clone(),
                    size: info.size,
                    notes: info.notes.clone(),
                };
                self.lock().pending = Some(PendingInstall::from(info.clone()));
                self.transition(available.clone());
                self.listener
                    .on_update_available(info.version, &info.notes, info.size);
                available
            }
            Ok(Some(info)) => {
                info!(
                    "check_for_update: up to date (server {}, current {})",
                    info.version, self.config.current_version
                );
                self.lock().pending = None;
                self.transition(UpdateState::UpToDate);
                self.listener.on_no_update();
                self.transition(UpdateState::Idle);
                UpdateState::Idle
            }
            Ok(None) => {
                // Unparsable reply: already logged, nothing to report.
                self.transition(UpdateState::Idle);
                UpdateState::Idle
            }
            Err(err) => self.fail(err),
        }
    }

    /// Start downloading the pending install file, or cancel the running
    /// download if there is one.
    ///
    /// Resolves when the download reaches a terminal state.
    pub async fn start_download(&self) -> UpdateState {
        let (pending, cancel, downloading) = {
            let mut inner = self.lock();
            match &inner.state {
                UpdateState::Downloading { .. } => {
                    info!("start_download: already downloading; treating as cancel");
                    if let Some(token) = &inner.cancel {
                        token.cancel();
                    }
                    return inner.state.clone();
                }
                UpdateState::UpdateAvailable { .. } | UpdateState::Idle => {}
                other => {
                    warn!("start_download: ignored while {}", other.label());
                    return other.clone();
                }
            }
            let Some(pending) = inner.pending.clone() else {
                warn!("start_download: no install file pending");
                return inner.state.clone();
            };
            let initial = if pending.size > 0 {
                Progress::Percent(0)
            } else {
                Progress::Indeterminate { received: 0 }
            };
            let downloading = UpdateState::Downloading {
                file: pending.file.clone(),
                progress: initial,
            };
            // Claimed under the same lock as the check above: at most one
            // session can exist.
            info!("state: {} -> {}", inner.state.label(), downloading.label());
            inner.state = downloading.clone();
            let cancel = CancelToken::new();
            inner.cancel = Some(cancel.clone());
            (pending, cancel, downloading)
        };
        self.listener.on_state_changed(&downloading);

        info!(
            "start_download: fetching version {} as {:?}",
            format_version(pending.version),
            pending.file
        );
        debug!("start_download: release notes: {:?}", pending.notes);

        let outcome = self.run_download(&pending, cancel).await;
        self.lock().cancel = None;

        match outcome {
            Ok(DownloadOutcome::Completed { path, received }) => {
                info!(
                    "start_download: {} ready ({} bytes)",
                    path.display(),
                    received
                );
                self.transition(UpdateState::Completed { path: path.clone() });
                self.listener.on_download_complete(&path);
                self.transition(UpdateState::Idle);
                UpdateState::Idle
            }
            Ok(DownloadOutcome::Cancelled { received }) => {
                info!("start_download: cancelled after {received} bytes");
                self.transition(UpdateState::Cancelled);
                self.listener.on_download_cancelled();
                self.transition(UpdateState::Idle);
                UpdateState::Idle
            }
            Err(err) => self.fail(err),
        }
    }

    /// Request cancellation of the running download.
    ///
    /// Returns immediately; the download reports `Cancelled` once the
    /// transfer has actually stopped. Returns `false` if nothing is running.
    pub fn cancel(&self) -> bool {
        let inner = self.lock();
        match (&inner.state, &inner.cancel) {
            (UpdateState::Downloading { .. }, Some(token)) => {
                token.cancel();
                info!("cancel: requested");
                true
            }
            (state, _) => {
                debug!("cancel: nothing to cancel while {}", state.label());
                false
            }
        }
    }

    /// Decline the offered update.
    pub fn dismiss(&self) {
        let offered = {
            let mut inner = self.lock();
            let offered = matches!(inner.state, UpdateState::UpdateAvailable { .. });
            if offered || inner.state == UpdateState::Idle {
                inner.pending = None;
            }
            offered
        };
        if offered {
            info!("dismiss: update declined");
            self.transition(UpdateState::Idle);
        }
    }

    async fn run_download(
        &self,
        pending: &PendingInstall,
        cancel: CancelToken,
    ) -> Result<DownloadOutcome, UpdateError> {
        let dest = env::prepare_destination(
            &self.config.downloads_dir,
            &self.config.app_name,
            &pending.file,
        )
        .await?;
        let mut session = DownloadSession::new(dest, pending.size, cancel);
        session
            .start(
                &self.transport,
                self.config.app_id,
                &self.config.os_tag,
                |progress| {
                    self.record_progress(progress);
                    self.listener.on_progress(progress);
                },
            )
            .await
    }

    fn record_progress(&self, update: Progress) {
        if let UpdateState::Downloading { progress, .. } = &mut self.lock().state {
            *progress = update;
        }
    }

    fn fail(&self, err: UpdateError) -> UpdateState {
        let kind = err.kind();
        let detail = err.to_string();
        error!("update failed ({kind}): {detail}");
        self.transition(UpdateState::Failed {
            kind,
            detail: detail.clone(),
        });
        self.listener.on_error(kind, &detail);
        self.transition(UpdateState::Idle);
        UpdateState::Idle
    }

    fn transition(&self, next: UpdateState) {
        {
            let mut inner = self.lock();
            if inner.state == next {
                return;
            }
            info!("state: {} -> {}", inner.state.label(), next.label());
            inner.state = next.clone();
        }
        self.listener.on_state_changed(&next);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
