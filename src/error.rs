//! Error types.
//!
//! [`Error`] describes what went wrong talking to the backend. [`SessionError`]
//! is what the coordinators record: every failure is recovered where it is
//! raised and replaced by a fixed, user-facing text.

use thiserror::Error;

/// Text shown when a document submission fails.
pub const UPLOAD_FAILED_TEXT: &str = "Error uploading the PDF";

/// Text shown when the ingestion stream reports a failure.
pub const CHANNEL_FAILED_TEXT: &str = "Error while processing the PDF";

/// Text recorded as the answer of a failed question.
pub const QUERY_FAILED_TEXT: &str = "Error while answering the question";

/// Transport error type.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend returned a non-success response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// Push stream ended before a terminal event.
    #[error("Stream ended unexpectedly")]
    StreamEnded,

    /// Backend could not serve the request.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures recorded by the session coordinators.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Document submission failed (network or non-2xx).
    #[error("document upload failed: {0}")]
    Upload(#[source] Error),

    /// Ingestion status stream failed after a successful submission.
    #[error("notification channel failed: {0}")]
    Channel(#[source] Error),

    /// Question could not be answered.
    #[error("query failed: {0}")]
    Query(#[source] Error),

    /// Operation invoked in a state that does not allow it.
    #[error("precondition failed: {0}")]
    Precondition(&'static str),

    /// Internal state no longer matches its invariants.
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
}

impl SessionError {
    /// Fixed text shown to the user in place of the expected result.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Upload(_) => UPLOAD_FAILED_TEXT,
            Self::Channel(_) => CHANNEL_FAILED_TEXT,
            Self::Query(_) => QUERY_FAILED_TEXT,
            Self::Precondition(reason) | Self::InvariantViolation(reason) => reason,
        }
    }
}
