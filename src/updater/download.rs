use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::engine::models::DownloadRequest;
use crate::engine::state::Progress;
use crate::error::UpdateError;
use crate::networking::UpgradeTransport;
use crate::util::{CancelToken, progress_percent};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { path: PathBuf, received: u64 },
    /// The partial file is left on disk.
    Cancelled { received: u64 },
}

/// One attempt at fetching the install file.
///
/// Bytes are appended to the destination as each chunk arrives, so memory
/// use does not grow with the installer and a crash leaves the received
/// prefix on disk. Every attempt starts from zero.
#[derive(Debug)]
pub struct DownloadSession {
    dest: PathBuf,
    expected_size: u64,
    received: u64,
    in_progress: bool,
    cancel: CancelToken,
}

impl DownloadSession {
    pub fn new(dest: impl Into<PathBuf>, expected_size: u64, cancel: CancelToken) -> Self {
        Self {
            dest: dest.into(),
            expected_size,
            received: 0,
            in_progress: false,
            cancel,
        }
    }

    /// Request the install file and stream it to disk.
    ///
    /// `progress` is called once per received chunk.
    ///
    /// # Errors
    /// Transport failures, a body shorter than announced, and filesystem
    /// failures end the attempt. Nothing is retried.
    pub async fn start<T, F>(
        &mut self,
        transport: &T,
        app_id: i64,
        os: &str,
        progress: F,
    ) -> Result<DownloadOutcome, UpdateError>
    where
        T: UpgradeTransport + ?Sized,
        F: FnMut(Progress),
    {
        remove_stale(&self.dest).await?;
        self.received = 0;
        self.in_progress = true;
        info!(
            "download: fetching {} ({} bytes expected)",
            self.dest.display(),
            self.expected_size
        );

        let body = serde_json::to_vec(&DownloadRequest::new(app_id, os))?;
        let cancel = self.cancel.clone();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            response = transport.post_streaming(body) => Some(response),
        };
        let Some(response) = response else {
            return Ok(self.finish_cancelled());
        };
        let stream = response.map_err(|err| self.fail(err))?;
        self.consume(stream, progress).await
    }

    /// Persist `stream` chunk by chunk until it completes, ends, fails or is
    /// cancelled.
    pub async fn consume<S, F>(
        &mut self,
        mut stream: S,
        mut progress: F,
    ) -> Result<DownloadOutcome, UpdateError>
    where
        S: Stream<Item = Result<Bytes, UpdateError>> + Unpin,
        F: FnMut(Progress),
    {
        self.in_progress = true;
        let opened = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.dest)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(e) => {
                let err = UpdateError::filesystem("failed to open", &self.dest, e);
                return Err(self.fail(err));
            }
        };

        let cancel = self.cancel.clone();
        loop {
            // A chunk that is already buffered wins over a pending cancel.
            let next = tokio::select! {
                biased;
                next = stream.next() => Some(next),
                () = cancel.cancelled() => None,
            };
            let Some(next) = next else {
                // Dropping the stream aborts the transfer.
                return Ok(self.finish_cancelled());
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(update) = self.on_chunk(&mut file, &chunk).await? {
                        progress(update);
                    }
                    if self.cancel.is_cancelled() {
                        return Ok(self.finish_cancelled());
                    }
                    if self.is_complete() {
                        return Ok(self.finish_completed());
                    }
                }
                Some(Err(err)) => {
                    warn!(
                        "download: transfer failed after {} bytes: {err}",
                        self.received
                    );
                    return Err(self.fail(err));
                }
                None => return self.on_end_of_body(),
            }
        }
    }

    /// Append one chunk and account for it. Chunks delivered after the
    /// session has finished are dropped.
    pub async fn on_chunk(
        &mut self,
        file: &mut File,
        chunk: &[u8],
    ) -> Result<Option<Progress>, UpdateError> {
        if !self.in_progress {
            debug!(
                "download: ignoring {} bytes delivered after the session ended",
                chunk.len()
            );
            return Ok(None);
        }
        if chunk.is_empty() {
            return Ok(None);
        }

        if let Err(err) = write_chunk(file, chunk).await {
            let err = UpdateError::filesystem("failed to write", &self.dest, err);
            return Err(self.fail(err));
        }
        self.received += chunk.len() as u64;

        let update = self.progress();
        debug!(
            "download: received {} of {} bytes ({update})",
            self.received, self.expected_size
        );
        Ok(Some(update))
    }

    pub fn progress(&self) -> Progress {
        match progress_percent(self.received, self.expected_size) {
            Some(pct) => Progress::Percent(pct),
            None => Progress::Indeterminate {
                received: self.received,
            },
        }
    }

    fn is_complete(&self) -> bool {
        self.in_progress && self.expected_size > 0 && self.received >= self.expected_size
    }

    fn on_end_of_body(&mut self) -> Result<DownloadOutcome, UpdateError> {
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled());
        }
        if self.expected_size == 0 || self.is_complete() {
            return Ok(self.finish_completed());
        }
        let err = UpdateError::Incomplete {
            received: self.received,
            expected: self.expected_size,
        };
        warn!("download: {err}");
        Err(self.fail(err))
    }

    fn finish_completed(&mut self) -> DownloadOutcome {
        self.in_progress = false;
        info!(
            "download: completed {} ({} bytes)",
            self.dest.display(),
            self.received
        );
        DownloadOutcome::Completed {
            path: self.dest.clone(),
            received: self.received,
        }
    }

    fn finish_cancelled(&mut self) -> DownloadOutcome {
        self.in_progress = false;
        warn!(
            "download: cancelled after {} bytes; partial file kept at {}",
            self.received,
            self.dest.display()
        );
        DownloadOutcome::Cancelled {
            received: self.received,
        }
    }

    fn fail(&mut self, err: UpdateError) -> UpdateError {
        self.in_progress = false;
        err
    }
}

async fn write_chunk(file: &mut File, chunk: &[u8]) -> io::Result<()> {
    file.write_all(chunk).await?;
    file.flush().await
}

async fn remove_stale(dest: &Path) -> Result<(), UpdateError> {
    match fs::remove_file(dest).await {
        Ok(()) => {
            debug!("download: removed previous file {}", dest.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(UpdateError::filesystem("failed to remove", dest, err)),
    }
}
