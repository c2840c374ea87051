//! Document upload and ingestion tracking.
//!
//! An upload session submits one PDF tagged with a client-generated
//! [`CorrelationId`], then listens on a [`NotificationChannel`] keyed by the
//! same id until the backend reports the ingestion outcome.
//!
//! # Architecture
//!
//! - [`UploadCoordinator`]: `Idle → Uploading → Processing → Completed | Failed`
//! - [`NotificationChannel`]: one-shot push subscription, `Connecting → Open → Closed`
//! - [`UploadStatus`]: lifecycle of the session
//!
//! After a terminal ingestion event the status message is cleared after a
//! short delay and the session returns to `Idle`.

mod channel;
mod coordinator;
mod correlation;
mod file;
mod status;

pub use channel::{
    ChannelState, CloseReason, IngestionListener, IngestionOutcome, NotificationChannel,
};
pub use coordinator::{UploadCoordinator, UploadView};
pub use correlation::CorrelationId;
pub use file::SelectedFile;
pub use status::{
    COMPLETED_TEXT, DEFAULT_STATUS_CLEAR_DELAY, PROCESSING_TEXT, UPLOADING_TEXT, UploadStatus,
};
