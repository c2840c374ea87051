//! PDF Chat Assistant
//!
//! Client for a document question-answering backend: upload a PDF for
//! ingestion, follow the ingestion status over server push, then hold a
//! question/answer conversation against it.
//!
//! # Architecture
//!
//! - **Upload**: submits the document with a correlation id and opens a
//!   one-shot notification channel keyed by that id
//! - **Conversation**: optimistic transcript with single-flight questions
//! - **Backend**: transport trait with HTTP (`reqwest` + SSE) and scripted
//!   in-memory implementations
//!
//! # Modules
//!
//! - [`app`]: composition of both coordinators
//! - [`backend`]: transport to the ingestion / QA service
//! - [`config`]: CLI and layered configuration
//! - [`conversation`]: transcript and question coordinator
//! - [`error`]: transport and session error types
//! - [`upload`]: upload coordinator and notification channel
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdf_chat_assistant::backend::HttpBackend;
//! use pdf_chat_assistant::conversation::{ConversationStore, QueryCoordinator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(HttpBackend::new("http://localhost:8000")?);
//! let query = QueryCoordinator::new(backend, ConversationStore::new());
//!
//! let _ = query.ask("What is this document about?").await;
//! for message in query.store().messages() {
//!     println!("{}: {:?}", message.question, message.answer);
//! }
//! # Ok(())
//! # }
//! ```

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod app;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod upload;

pub use app::ChatApp;
pub use error::{Error, SessionError};
