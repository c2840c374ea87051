//! Composition root: one upload session and one conversation over a shared backend.

use std::sync::Arc;

use crate::backend::{Backend, HttpBackend};
use crate::config::AppConfig;
use crate::conversation::{ConversationStore, QueryCoordinator};
use crate::error::Result;
use crate::upload::UploadCoordinator;

/// Client state for one user session.
///
/// The two coordinators share the backend but no state; an upload and a
/// question may be in flight at the same time.
#[derive(Debug)]
pub struct ChatApp {
    /// Document upload and ingestion tracking.
    pub upload: UploadCoordinator,
    /// Question/answer conversation.
    pub query: QueryCoordinator,
}

impl ChatApp {
    /// Build the session from configuration, talking HTTP to `backend.url`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config.backend.url)?);
        Ok(Self::new(backend, config))
    }

    /// Build the session over any backend.
    pub fn new(backend: Arc<dyn Backend>, config: &AppConfig) -> Self {
        Self {
            upload: UploadCoordinator::with_clear_delay(
                Arc::clone(&backend),
                config.session.status_clear_delay(),
            ),
            query: QueryCoordinator::new(backend, ConversationStore::new()),
        }
    }
}
