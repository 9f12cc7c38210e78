use std::sync::Arc;

use tokio::sync::watch;

/// Cancellation flag shared between the controller and the active download.
///
/// Raising it is synchronous; the download notices it at its next chunk
/// boundary or while it is waiting on the transport.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called, immediately if it already was.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once raised.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute download progress as a whole percentage, capped at 100.
///
/// Returns `None` when the expected size is unknown.
#[must_use]
pub fn progress_percent(received: u64, expected: u64) -> Option<u8> {
    if expected == 0 {
        return None;
    }
    let pct = (u128::from(received) * 100 / u128::from(expected)).min(100);
    Some(pct as u8)
}

/// Render a human-friendly byte count.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;

    let value = bytes as f64;
    if value < KIB {
        format!("{bytes} B")
    } else if value < MIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{:.1} MB", value / MIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn formats_size_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2_048), "2.0 KB");
        assert_eq!(format_size(5_242_880), "5.0 MB");
    }

    #[test]
    fn calculates_progress_percent() {
        assert_eq!(progress_percent(0, 10), Some(0));
        assert_eq!(progress_percent(5, 10), Some(50));
        assert_eq!(progress_percent(9, 10), Some(90));
        assert_eq!(progress_percent(10, 10), Some(100));
        assert_eq!(progress_percent(15, 10), Some(100));
        assert_eq!(progress_percent(5, 0), None);
    }

    #[test]
    fn progress_percent_floors() {
        assert_eq!(progress_percent(1, 3), Some(33));
        assert_eq!(progress_percent(2, 3), Some(66));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_raised() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("already-cancelled token should not block");
    }
}
