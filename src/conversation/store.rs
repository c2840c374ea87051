//! Ordered question/answer transcript.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::SessionError;

/// Resolution state of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Asked, answer not yet known.
    Pending,
    /// Answered.
    Resolved,
    /// The question could not be answered; `answer` holds the error text.
    Failed,
}

/// One question and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The question, trimmed and non-empty.
    pub question: String,
    /// Answer text once resolved.
    pub answer: Option<String>,
    /// Resolution state.
    pub state: MessageState,
}

impl Message {
    fn pending(question: String) -> Self {
        Self {
            question,
            answer: None,
            state: MessageState::Pending,
        }
    }

    /// Whether the answer is still outstanding.
    pub fn is_pending(&self) -> bool {
        self.state == MessageState::Pending
    }
}

/// Transcript of a conversation, in the order questions were asked.
///
/// At most one message is pending, and it is always the last one. Messages
/// are never removed. Clones share the same transcript.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    inner: Arc<watch::Sender<Vec<Message>>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(watch::Sender::new(Vec::new())),
        }
    }

    /// Append a pending message for `question`.
    ///
    /// Returns `Ok(false)` without touching the transcript when the trimmed
    /// question is empty. Fails if a message is already pending.
    pub fn append(&self, question: &str) -> Result<bool, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(false);
        }

        let mut result = Ok(true);
        self.inner.send_if_modified(|messages| {
            if messages.last().is_some_and(Message::is_pending) {
                result = Err(SessionError::InvariantViolation(
                    "a question is already awaiting its answer",
                ));
                return false;
            }
            messages.push(Message::pending(question.to_string()));
            true
        });
        result
    }

    /// Resolve the pending last message with `answer`.
    ///
    /// `is_error` marks the message `Failed` instead of `Resolved`. Earlier
    /// messages are untouched.
    pub fn resolve(&self, answer: impl Into<String>, is_error: bool) -> Result<(), SessionError> {
        let answer = answer.into();
        let mut result = Ok(());
        self.inner.send_if_modified(|messages| {
            let Some(last) = messages.last_mut().filter(|m| m.is_pending()) else {
                result = Err(SessionError::InvariantViolation(
                    "no pending question to resolve",
                ));
                return false;
            };
            last.answer = Some(answer);
            last.state = if is_error {
                MessageState::Failed
            } else {
                MessageState::Resolved
            };
            true
        });
        result
    }

    /// Get all messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.inner.borrow().clone()
    }

    /// Get the last message.
    #[must_use]
    pub fn last(&self) -> Option<Message> {
        self.inner.borrow().last().cloned()
    }

    /// Whether the last message is still pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner.borrow().last().is_some_and(Message::is_pending)
    }

    /// Get the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// Check if the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch transcript changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_then_resolve() {
        let store = ConversationStore::new();

        assert!(store.append("  What is X?  ").unwrap());
        assert!(store.has_pending());
        assert_eq!(
            store.last().unwrap(),
            Message {
                question: "What is X?".into(),
                answer: None,
                state: MessageState::Pending,
            }
        );

        store.resolve("a", false).unwrap();
        assert_eq!(
            store.messages(),
            vec![Message {
                question: "What is X?".into(),
                answer: Some("a".into()),
                state: MessageState::Resolved,
            }]
        );
    }

    #[test]
    fn test_blank_question_is_ignored() {
        let store = ConversationStore::new();
        assert!(!store.append("").unwrap());
        assert!(!store.append(" \n\t ").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_resolve_leaves_earlier_messages() {
        let store = ConversationStore::new();
        store.append("first").unwrap();
        store.resolve("one", false).unwrap();
        store.append("second").unwrap();
        store.resolve("boom", true).unwrap();

        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].answer.as_deref(), Some("one"));
        assert_eq!(messages[0].state, MessageState::Resolved);
        assert_eq!(messages[1].answer.as_deref(), Some("boom"));
        assert_eq!(messages[1].state, MessageState::Failed);
    }

    #[test]
    fn test_resolve_without_pending() {
        let store = ConversationStore::new();
        assert!(matches!(
            store.resolve("orphan", false),
            Err(SessionError::InvariantViolation(_))
        ));

        store.append("q").unwrap();
        store.resolve("a", false).unwrap();
        assert!(matches!(
            store.resolve("again", false),
            Err(SessionError::InvariantViolation(_))
        ));
        assert_eq!(store.last().unwrap().answer.as_deref(), Some("a"));
    }

    #[test]
    fn test_single_pending_message() {
        let store = ConversationStore::new();
        store.append("first").unwrap();
        assert!(matches!(
            store.append("second"),
            Err(SessionError::InvariantViolation(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clones_share_transcript() {
        let store = ConversationStore::new();
        let view = store.clone();
        let rx = store.subscribe();

        store.append("shared?").unwrap();
        assert_eq!(view.len(), 1);
        assert!(rx.has_changed().unwrap());
    }
}
