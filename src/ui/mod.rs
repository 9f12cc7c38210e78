use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::{Builder, Runtime};

use crate::engine::models::format_version;
use crate::engine::state::{Progress, UpdateEvent};
use crate::util::format_size;

pub fn build_runtime() -> Arc<Runtime> {
    match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(err) => {
            warn!(
                "ui: failed to create multithreaded runtime ({}); trying single-threaded runtime",
                err
            );
            match Builder::new_current_thread().enable_all().build() {
                Ok(rt) => Arc::new(rt),
                Err(fallback_err) => {
                    error!(
                        "ui: failed to create any Tokio runtime ({}); terminating updater",
                        fallback_err
                    );
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Terminal front end: prints notifications, draws download progress and
/// asks the yes/no questions.
pub struct TerminalUi {
    assume_yes: bool,
    bar: Option<ProgressBar>,
}

impl TerminalUi {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            bar: None,
        }
    }

    /// Show one event. Returns `true` if it ends a download.
    pub fn render(&mut self, event: &UpdateEvent) -> bool {
        if let UpdateEvent::Progress(progress) = event {
            self.show_progress(*progress);
            return false;
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if let Some(message) = describe(event) {
            println!("{message}");
        }
        ends_download(event)
    }

    /// Ask a yes/no question on stdin. Anything but "y"/"yes" is a no.
    pub async fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            println!("{question} [y/N] y");
            return true;
        }
        let mut stdout = tokio::io::stdout();
        let prompt = format!("{question} [y/N] ");
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(err) => {
                warn!("ui: could not read answer: {err}");
                false
            }
        }
    }

    fn show_progress(&mut self, progress: Progress) {
        let bar = self.bar.get_or_insert_with(|| match progress {
            Progress::Percent(_) => percent_bar(),
            Progress::Indeterminate { .. } => spinner(),
        });
        match progress {
            Progress::Percent(pct) => bar.set_position(u64::from(pct)),
            Progress::Indeterminate { received } => bar.set_message(format_size(received)),
        }
    }
}

fn percent_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}% ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━");
    bar.set_style(style);
    bar.set_prefix("Downloading");
    bar
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{prefix:.bold.cyan} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.set_prefix("Downloading");
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn ends_download(event: &UpdateEvent) -> bool {
    matches!(
        event,
        UpdateEvent::DownloadComplete { .. }
            | UpdateEvent::DownloadCancelled
            | UpdateEvent::Error { .. }
    )
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Text shown for an event; progress is drawn, not printed.
pub fn describe(event: &UpdateEvent) -> Option<String> {
    match event {
        UpdateEvent::NoUpdate => Some("No new upgrade available.".into()),
        UpdateEvent::UpdateAvailable {
            version,
            notes,
            file_size,
        } => {
            let mut text = format!("New version {} is available", format_version(*version));
            if *file_size > 0 {
                text.push_str(&format!(" ({})", format_size(*file_size)));
            }
            text.push('.');
            if !notes.is_empty() {
                text.push_str("\n\n");
                text.push_str(notes);
            }
            Some(text)
        }
        UpdateEvent::Progress(_) => None,
        UpdateEvent::DownloadComplete { path } => Some(format!(
            "File downloaded successfully.\n\n{}",
            path.display()
        )),
        UpdateEvent::DownloadCancelled => {
            Some("Download cancelled; the partial file was kept.".into())
        }
        UpdateEvent::Error { kind, detail } => Some(format!("Update failed ({kind}): {detail}")),
    }
}

/// Hand the installer to whatever the desktop opens it with.
pub fn launch_installer(path: &Path) -> Result<(), String> {
    open::that(path).map_err(|e| format!("failed to open {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::error::ErrorKind;

    #[test]
    fn describes_offers_with_size_and_notes() {
        let text = describe(&UpdateEvent::UpdateAvailable {
            version: 200,
            notes: "bugfixes".into(),
            file_size: 1_048_576,
        })
        .unwrap();
        assert_eq!(text, "New version 2.00 is available (1.0 MB).\n\nbugfixes");

        let bare = describe(&UpdateEvent::UpdateAvailable {
            version: 153,
            notes: String::new(),
            file_size: 0,
        })
        .unwrap();
        assert_eq!(bare, "New version 1.53 is available.");
    }

    #[test]
    fn progress_is_not_printed() {
        assert_eq!(describe(&UpdateEvent::Progress(Progress::Percent(40))), None);
    }

    #[test]
    fn terminal_events_end_the_download_view() {
        let mut ui = TerminalUi::new(true);
        assert!(!ui.render(&UpdateEvent::Progress(Progress::Percent(10))));
        assert!(ui.bar.is_some());
        assert!(ui.render(&UpdateEvent::DownloadComplete {
            path: PathBuf::from("/tmp/a.exe"),
        }));
        assert!(ui.bar.is_none());
        assert!(ui.render(&UpdateEvent::DownloadCancelled));
        assert!(ui.render(&UpdateEvent::Error {
            kind: ErrorKind::Transport,
            detail: "reset".into(),
        }));
        assert!(!ui.render(&UpdateEvent::NoUpdate));
    }

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
    }

    #[tokio::test]
    async fn assume_yes_skips_the_prompt() {
        let mut ui = TerminalUi::new(true);
        assert!(ui.confirm("Download in background?").await);
    }
}
