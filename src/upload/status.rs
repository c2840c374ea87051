//! Upload lifecycle status and the deferred status clear.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Default delay before a terminal status message is cleared.
pub const DEFAULT_STATUS_CLEAR_DELAY: Duration = Duration::from_millis(2000);

/// Shown while the document is being sent.
pub const UPLOADING_TEXT: &str = "Uploading PDF...";

/// Shown once the backend accepted the document.
pub const PROCESSING_TEXT: &str = "PDF sent, processing...";

/// Shown when the backend reports the document as ingested.
pub const COMPLETED_TEXT: &str = "Vectors ready, you can ask questions now.";

/// Lifecycle of one upload session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Nothing submitted; a file may be selected.
    #[default]
    Idle,
    /// Submission request in flight.
    Uploading,
    /// Backend accepted the document; waiting on the notification channel.
    Processing,
    /// Ingestion finished.
    Completed,
    /// Submission or ingestion failed.
    Failed,
}

impl UploadStatus {
    /// Whether a notification channel may exist in this status.
    pub fn allows_channel(self) -> bool {
        matches!(self, Self::Processing | Self::Completed | Self::Failed)
    }

    /// Whether an operation is in progress.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A scheduled status clear. Dropping it cancels the task.
#[derive(Debug)]
pub(crate) struct DeferredClear {
    cancel: CancellationToken,
}

impl DeferredClear {
    /// Run `action` after `delay` unless cancelled first.
    pub(crate) fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => action.await,
            }
        });
        Self { cancel }
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DeferredClear {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn channel_only_after_submission() {
        assert!(!UploadStatus::Idle.allows_channel());
        assert!(!UploadStatus::Uploading.allows_channel());
        assert!(UploadStatus::Processing.allows_channel());
        assert!(UploadStatus::Completed.allows_channel());
        assert!(UploadStatus::Failed.allows_channel());
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_clear_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _clear = DeferredClear::schedule(Duration::from_millis(2000), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_clear_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let clear = DeferredClear::schedule(Duration::from_millis(10), async move {
            flag.store(true, Ordering::SeqCst);
        });
        drop(clear);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_clear_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let clear = DeferredClear::schedule(Duration::from_millis(10), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        clear.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
