//! Transport to the ingestion / question-answering backend.
//!
//! The coordinators only talk to the backend through the [`Backend`] trait,
//! so the push subscription and both requests can be replaced in tests.
//!
//! # Implementations
//!
//! - [`HttpBackend`]: `reqwest` client for the real service
//! - [`InMemoryBackend`]: scripted backend for tests and demos
//!
//! # Contract
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload    | `POST {backend}/upload_pdf`, multipart `file` + `upload_id` |
//! | subscribe | `GET {backend}/notifications/{correlation_id}` (SSE) |
//! | ask       | `POST {backend}/ask`, JSON `{"question": ..}` → `{"answer": ..}` |

pub mod http;
pub mod memory;
pub mod sse;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

use std::fmt::Debug;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::upload::{CorrelationId, SelectedFile};

/// Payload that signals a finished ingestion on the notification stream.
pub const COMPLETED_PAYLOAD: &str = "completed";

/// Stream of push payloads. An `Err` item is a transport failure.
pub type PushStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Backend operations used by the coordinators.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Submit a document tagged with the session's correlation id.
    ///
    /// Any 2xx response is success.
    async fn upload_document(
        &self,
        file: &SelectedFile,
        correlation_id: &CorrelationId,
    ) -> Result<()>;

    /// Open the ingestion status stream for a correlation id.
    async fn subscribe(&self, correlation_id: &CorrelationId) -> Result<PushStream>;

    /// Ask a question and return the answer text.
    async fn ask(&self, question: &str) -> Result<String>;
}

/// Body of `POST /ask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    /// The question, already trimmed.
    pub question: String,
}

/// Successful response of `POST /ask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    /// Answer text (markdown).
    pub answer: String,
}
