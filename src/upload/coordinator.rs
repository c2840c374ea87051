//! Upload session coordinator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::channel::{ChannelState, IngestionListener, IngestionOutcome, NotificationChannel};
use super::status::{
    COMPLETED_TEXT, DEFAULT_STATUS_CLEAR_DELAY, DeferredClear, PROCESSING_TEXT, UPLOADING_TEXT,
    UploadStatus,
};
use super::{CorrelationId, SelectedFile};
use crate::backend::Backend;
use crate::error::{SessionError, UPLOAD_FAILED_TEXT};

/// What a presentation layer needs to render an upload session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadView {
    /// Lifecycle status.
    pub status: UploadStatus,
    /// User-facing status message, if any.
    pub message: Option<String>,
    /// Name of the selected file, if any.
    pub selected_file: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    status: UploadStatus,
    message: Option<String>,
    selected: Option<SelectedFile>,
    channel: Option<NotificationChannel>,
    clear: Option<DeferredClear>,
    /// Bumped on every status change; a stale deferred clear is ignored.
    epoch: u64,
    torn_down: bool,
}

impl SessionState {
    fn set_status(&mut self, status: UploadStatus, message: Option<&str>) {
        self.status = status;
        self.message = message.map(ToString::to_string);
        self.epoch += 1;
        if let Some(clear) = self.clear.take() {
            clear.cancel();
        }
    }

    fn view(&self) -> UploadView {
        UploadView {
            status: self.status,
            message: self.message.clone(),
            selected_file: self.selected.as_ref().map(|f| f.name().to_string()),
        }
    }

    fn can_submit(&self) -> bool {
        matches!(self.status, UploadStatus::Idle | UploadStatus::Failed) && self.channel.is_none()
    }
}

#[derive(Debug)]
struct Shared {
    me: Weak<Shared>,
    correlation_id: CorrelationId,
    clear_delay: Duration,
    state: Mutex<SessionState>,
    view: watch::Sender<UploadView>,
}

impl Shared {
    /// Apply `f` to the current state and publish the resulting view.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state);
        let view = state.view();
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
        out
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_clear(&self, state: &mut SessionState) {
        let weak = self.me.clone();
        let epoch = state.epoch;
        state.clear = Some(DeferredClear::schedule(self.clear_delay, async move {
            if let Some(shared) = weak.upgrade() {
                shared.clear_status(epoch);
            }
        }));
    }

    fn clear_status(&self, epoch: u64) {
        self.update(|state| {
            if state.epoch != epoch || state.torn_down {
                return;
            }
            state.clear = None;
            state.channel = None;
            state.set_status(UploadStatus::Idle, None);
        });
    }

    fn teardown(&self) {
        self.update(|state| {
            state.torn_down = true;
            if let Some(clear) = state.clear.take() {
                clear.cancel();
            }
            if let Some(channel) = state.channel.as_ref() {
                channel.close();
            }
        });
    }
}

impl IngestionListener for Shared {
    fn ingestion_finished(&self, correlation_id: CorrelationId, outcome: IngestionOutcome) {
        self.update(|state| {
            if state.torn_down || state.status != UploadStatus::Processing {
                return;
            }
            match &outcome {
                IngestionOutcome::Completed => {
                    info!(name: "upload.ingested", correlation_id = %correlation_id, "Document ingestion completed");
                    state.set_status(UploadStatus::Completed, Some(COMPLETED_TEXT));
                }
                IngestionOutcome::Failed(err) => {
                    warn!(name: "upload.ingestion_failed", correlation_id = %correlation_id, error = %err, "Document ingestion failed");
                    state.set_status(UploadStatus::Failed, Some(err.user_message()));
                }
            }
            self.schedule_clear(state);
        });
    }
}

/// Drives one upload session: file selection, submission and the
/// ingestion notification channel.
///
/// The correlation id is generated at construction and never changes.
/// Dropping the coordinator closes any open channel and cancels a pending
/// status clear.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pdf_chat_assistant::backend::HttpBackend;
/// use pdf_chat_assistant::upload::{SelectedFile, UploadCoordinator};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(HttpBackend::new("http://localhost:8000")?);
/// let upload = UploadCoordinator::new(backend);
///
/// upload.select_file(SelectedFile::from_path("doc.pdf").await?)?;
/// upload.submit().await?;
///
/// let mut view = upload.subscribe();
/// view.wait_for(|v| !v.status.is_busy()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct UploadCoordinator {
    backend: Arc<dyn Backend>,
    shared: Arc<Shared>,
}

impl UploadCoordinator {
    /// Create an idle session with a fresh correlation id.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_clear_delay(backend, DEFAULT_STATUS_CLEAR_DELAY)
    }

    /// Create an idle session with a custom status clear delay.
    pub fn with_clear_delay(backend: Arc<dyn Backend>, clear_delay: Duration) -> Self {
        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            correlation_id: CorrelationId::generate(),
            clear_delay,
            state: Mutex::new(SessionState::default()),
            view: watch::Sender::new(UploadView::default()),
        });
        Self { backend, shared }
    }

    /// Correlation id shared by the upload request and the channel.
    pub fn correlation_id(&self) -> CorrelationId {
        self.shared.correlation_id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> UploadStatus {
        self.shared.lock().status
    }

    /// Current status message.
    pub fn status_message(&self) -> Option<String> {
        self.shared.lock().message.clone()
    }

    /// Currently selected file.
    pub fn selected_file(&self) -> Option<SelectedFile> {
        self.shared.lock().selected.clone()
    }

    /// State of the notification channel, if one exists.
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.shared
            .lock()
            .channel
            .as_ref()
            .map(NotificationChannel::state)
    }

    /// Snapshot of everything a view renders.
    pub fn view(&self) -> UploadView {
        self.shared.view.borrow().clone()
    }

    /// Watch view changes.
    pub fn subscribe(&self) -> watch::Receiver<UploadView> {
        self.shared.view.subscribe()
    }

    /// Select the file to upload. Only allowed while idle.
    pub fn select_file(&self, file: SelectedFile) -> Result<(), SessionError> {
        self.shared.update(|state| {
            if state.status != UploadStatus::Idle {
                return Err(SessionError::Precondition(
                    "a file can only be selected while idle",
                ));
            }
            info!(name: "upload.file_selected", file = %file.name(), size = file.len(), "File selected");
            state.selected = Some(file);
            Ok(())
        })
    }

    /// Drop the selected file and return to idle.
    ///
    /// Only allowed while a file is selected and no submission is in flight.
    pub fn cancel(&self) -> Result<(), SessionError> {
        self.shared.update(|state| {
            if state.selected.is_none() {
                return Err(SessionError::Precondition("no file selected"));
            }
            if !state.can_submit() {
                return Err(SessionError::Precondition("a submission is in flight"));
            }
            state.selected = None;
            state.set_status(UploadStatus::Idle, None);
            Ok(())
        })
    }

    /// Submit the selected file.
    ///
    /// On success the session moves to `Processing` and opens exactly one
    /// notification channel for its correlation id. A failed submission is
    /// recovered here: the session moves to `Failed`, keeps the file for a
    /// retry and no channel is opened. Returns the resulting status.
    pub async fn submit(&self) -> Result<UploadStatus, SessionError> {
        let correlation_id = self.correlation_id();
        let (file, epoch) = self.shared.update(|state| {
            let Some(file) = state.selected.clone() else {
                return Err(SessionError::Precondition("no file selected"));
            };
            if !state.can_submit() {
                return Err(SessionError::Precondition("a submission is in flight"));
            }
            state.set_status(UploadStatus::Uploading, Some(UPLOADING_TEXT));
            Ok((file, state.epoch))
        })?;
        let mut submission = Submission {
            shared: &self.shared,
            epoch,
            finished: false,
        };

        info!(
            name: "upload.submitting",
            correlation_id = %correlation_id,
            file = %file.name(),
            size = file.len(),
            "Submitting document"
        );

        let result = self.backend.upload_document(&file, &correlation_id).await;
        submission.finished = true;

        let status = self.shared.update(|state| {
            if state.torn_down {
                return state.status;
            }
            match result {
                Ok(()) => {
                    info!(name: "upload.accepted", correlation_id = %correlation_id, "Document accepted, waiting for ingestion");
                    state.selected = None;
                    state.set_status(UploadStatus::Processing, Some(PROCESSING_TEXT));
                    if let Some(previous) = state.channel.take() {
                        previous.close();
                    }
                    let listener: Weak<dyn IngestionListener> = self.shared.me.clone();
                    state.channel = Some(NotificationChannel::open(
                        Arc::clone(&self.backend),
                        correlation_id,
                        listener,
                    ));
                }
                Err(e) => {
                    let err = SessionError::Upload(e);
                    warn!(name: "upload.failed", correlation_id = %correlation_id, error = %err, "Document submission failed");
                    state.set_status(UploadStatus::Failed, Some(err.user_message()));
                }
            }
            state.status
        });

        Ok(status)
    }

    /// Close any open channel and cancel a pending status clear.
    ///
    /// Called automatically on drop.
    pub fn shutdown(&self) {
        self.shared.teardown();
    }
}

/// An upload request in flight. Dropped unfinished, it fails the attempt and
/// keeps the file for a retry.
struct Submission<'a> {
    shared: &'a Shared,
    epoch: u64,
    finished: bool,
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let epoch = self.epoch;
        self.shared.update(|state| {
            if state.torn_down || state.epoch != epoch {
                return;
            }
            warn!(name: "upload.abandoned", correlation_id = %self.shared.correlation_id, "Submission dropped before the backend replied");
            state.set_status(UploadStatus::Failed, Some(UPLOAD_FAILED_TEXT));
        });
    }
}

impl Drop for UploadCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::error::Error;

    fn coordinator() -> (Arc<InMemoryBackend>, UploadCoordinator) {
        let backend = Arc::new(InMemoryBackend::new());
        let upload = UploadCoordinator::new(Arc::clone(&backend) as Arc<dyn Backend>);
        (backend, upload)
    }

    fn pdf() -> SelectedFile {
        SelectedFile::new("doc.pdf", b"%PDF-1.7".to_vec())
    }

    #[tokio::test]
    async fn submit_without_file_is_a_precondition_error() {
        let (backend, upload) = coordinator();
        let err = upload.submit().await.unwrap_err();
        assert!(matches!(err, SessionError::Precondition(_)));
        assert_eq!(upload.status(), UploadStatus::Idle);
        assert!(backend.uploads().is_empty());
    }

    #[tokio::test]
    async fn select_keeps_status_and_cancel_returns_to_idle() {
        let (_backend, upload) = coordinator();
        upload.select_file(pdf()).unwrap();
        assert_eq!(upload.status(), UploadStatus::Idle);
        assert_eq!(upload.view().selected_file.as_deref(), Some("doc.pdf"));

        upload.cancel().unwrap();
        assert!(upload.selected_file().is_none());
        assert_eq!(upload.view(), UploadView::default());
    }

    #[tokio::test]
    async fn cancel_without_selection_is_rejected() {
        let (_backend, upload) = coordinator();
        assert!(matches!(
            upload.cancel(),
            Err(SessionError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn failed_upload_keeps_file_and_opens_no_channel() {
        let (backend, upload) = coordinator();
        backend.push_upload_result(Err(Error::Api {
            status: 500,
            message: "disk full".into(),
        }));
        upload.select_file(pdf()).unwrap();

        assert_eq!(upload.submit().await.unwrap(), UploadStatus::Failed);
        assert_eq!(upload.status_message().as_deref(), Some(UPLOAD_FAILED_TEXT));
        assert!(upload.channel_state().is_none());
        assert!(upload.selected_file().is_some());

        // Retry from Failed with the kept file.
        assert_eq!(upload.submit().await.unwrap(), UploadStatus::Processing);
        assert_eq!(backend.uploads().len(), 2);
    }

    #[tokio::test]
    async fn cancel_after_failed_upload_returns_to_idle() {
        let (backend, upload) = coordinator();
        backend.push_upload_result(Err(Error::Unavailable("offline".into())));
        upload.select_file(pdf()).unwrap();
        upload.submit().await.unwrap();

        upload.cancel().unwrap();
        assert_eq!(upload.status(), UploadStatus::Idle);
        assert!(upload.status_message().is_none());
    }

    #[tokio::test]
    async fn select_is_rejected_while_processing() {
        let (_backend, upload) = coordinator();
        upload.select_file(pdf()).unwrap();
        upload.submit().await.unwrap();

        assert!(matches!(
            upload.select_file(pdf()),
            Err(SessionError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn cancel_and_submit_are_rejected_while_uploading() {
        let (backend, upload) = coordinator();
        let release = backend.defer_upload();
        upload.select_file(pdf()).unwrap();

        let submit = upload.submit();
        tokio::pin!(submit);
        // Drive the submission until it parks on the deferred reply.
        assert!(futures::poll!(submit.as_mut()).is_pending());
        assert_eq!(upload.status(), UploadStatus::Uploading);
        assert!(matches!(upload.cancel(), Err(SessionError::Precondition(_))));

        release.send(Ok(())).unwrap();
        assert_eq!(submit.await.unwrap(), UploadStatus::Processing);
    }

    #[tokio::test]
    async fn dropped_submission_fails_and_keeps_file() {
        let (backend, upload) = coordinator();
        let _release = backend.defer_upload();
        upload.select_file(pdf()).unwrap();

        {
            let submit = upload.submit();
            tokio::pin!(submit);
            assert!(futures::poll!(submit.as_mut()).is_pending());
            assert_eq!(upload.status(), UploadStatus::Uploading);
        }

        assert_eq!(upload.status(), UploadStatus::Failed);
        assert_eq!(upload.status_message().as_deref(), Some(UPLOAD_FAILED_TEXT));
        assert_eq!(upload.view().selected_file.as_deref(), Some("doc.pdf"));
        assert!(upload.channel_state().is_none());

        // The session is usable again: retry goes through.
        assert_eq!(upload.submit().await.unwrap(), UploadStatus::Processing);
        assert_eq!(backend.uploads().len(), 2);
    }

    #[tokio::test]
    async fn cancel_after_dropped_submission_returns_to_idle() {
        let (backend, upload) = coordinator();
        let _release = backend.defer_upload();
        upload.select_file(pdf()).unwrap();

        {
            let submit = upload.submit();
            tokio::pin!(submit);
            assert!(futures::poll!(submit.as_mut()).is_pending());
        }

        upload.cancel().unwrap();
        assert_eq!(upload.view(), UploadView::default());
        upload.select_file(pdf()).unwrap();
    }
}
