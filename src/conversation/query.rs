//! Single-flight question submission.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::store::ConversationStore;
use crate::backend::Backend;
use crate::error::{QUERY_FAILED_TEXT, SessionError};

/// Whether a question is outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Ready for a question.
    #[default]
    Idle,
    /// Waiting for the backend's answer.
    Awaiting,
}

/// Result of [`QueryCoordinator::ask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AskOutcome {
    /// Blank question, or another question is outstanding. Nothing changed.
    Skipped,
    /// The pending message was resolved with the backend's answer.
    Answered,
    /// The pending message was resolved with the fixed error text.
    Failed,
}

/// Sends questions to the backend, one at a time.
///
/// Each question is appended to the transcript before the request goes out
/// and resolved when it returns. While a question is outstanding, further
/// questions are dropped.
#[derive(Debug)]
pub struct QueryCoordinator {
    backend: Arc<dyn Backend>,
    store: ConversationStore,
    state: watch::Sender<QueryState>,
    input: Mutex<String>,
}

impl QueryCoordinator {
    /// Create an idle coordinator writing into `store`.
    pub fn new(backend: Arc<dyn Backend>, store: ConversationStore) -> Self {
        Self {
            backend,
            store,
            state: watch::Sender::new(QueryState::Idle),
            input: Mutex::new(String::new()),
        }
    }

    /// Transcript this coordinator writes into.
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Current flight state.
    pub fn state(&self) -> QueryState {
        *self.state.borrow()
    }

    /// Watch flight state changes.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Current input buffer.
    pub fn input(&self) -> String {
        self.lock_input().clone()
    }

    /// Replace the input buffer. Rejected while a question is outstanding.
    pub fn set_input(&self, text: impl Into<String>) -> bool {
        if self.state() == QueryState::Awaiting {
            return false;
        }
        *self.lock_input() = text.into();
        true
    }

    /// Ask whatever is in the input buffer.
    pub async fn submit_input(&self) -> AskOutcome {
        let question = self.input();
        self.ask(&question).await
    }

    /// Ask a question.
    ///
    /// No-op when the trimmed question is empty or another question is
    /// outstanding. Otherwise the question is appended as pending, the input
    /// buffer is cleared and the backend is queried. Transport failures are
    /// recorded as a failed message. The state always returns to `Idle`
    /// before this returns, and also if the future is dropped early.
    pub async fn ask(&self, question: &str) -> AskOutcome {
        let question = question.trim();
        if question.is_empty() {
            debug!("Ignoring blank question");
            return AskOutcome::Skipped;
        }
        let Some(mut flight) = self.begin_flight() else {
            debug!("Question dropped, another one is outstanding");
            return AskOutcome::Skipped;
        };

        match self.store.append(question) {
            Ok(true) => flight.appended = true,
            Ok(false) => return AskOutcome::Skipped,
            Err(e) => {
                error!(name: "query.append_failed", error = %e, "Could not record question");
                return AskOutcome::Skipped;
            }
        }
        self.lock_input().clear();

        info!(name: "query.sent", question_len = question.len(), "Question sent");
        match self.backend.ask(question).await {
            Ok(answer) => {
                info!(name: "query.answered", answer_len = answer.len(), "Answer received");
                flight.resolve(answer, false);
                AskOutcome::Answered
            }
            Err(e) => {
                let err = SessionError::Query(e);
                warn!(name: "query.failed", error = %err, "Question failed");
                flight.resolve(err.user_message(), true);
                AskOutcome::Failed
            }
        }
    }

    /// Move `Idle → Awaiting`, or `None` if already awaiting.
    fn begin_flight(&self) -> Option<Flight<'_>> {
        let started = self.state.send_if_modified(|state| {
            if *state == QueryState::Idle {
                *state = QueryState::Awaiting;
                true
            } else {
                false
            }
        });
        started.then_some(Flight {
            coordinator: self,
            appended: false,
            resolved: false,
        })
    }

    fn lock_input(&self) -> MutexGuard<'_, String> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An outstanding question. Dropping it returns the coordinator to `Idle`.
struct Flight<'a> {
    coordinator: &'a QueryCoordinator,
    appended: bool,
    resolved: bool,
}

impl Flight<'_> {
    fn resolve(&mut self, answer: impl Into<String>, is_error: bool) {
        self.resolved = true;
        if let Err(e) = self.coordinator.store.resolve(answer, is_error) {
            error!(name: "query.resolve_failed", error = %e, "Could not record answer");
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.appended && !self.resolved {
            warn!(name: "query.abandoned", "Question abandoned before its answer arrived");
            self.resolve(QUERY_FAILED_TEXT, true);
        }
        self.coordinator.state.send_replace(QueryState::Idle);
    }
}
