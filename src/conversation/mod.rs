//! Question/answer conversation against the ingested document.
//!
//! # Architecture
//!
//! - [`ConversationStore`]: ordered transcript; the last message may be pending
//! - [`QueryCoordinator`]: appends a question optimistically, queries the
//!   backend and resolves the pending message, one question at a time
//!
//! # Example
//!
//! ```rust
//! use pdf_chat_assistant::conversation::{ConversationStore, MessageState};
//!
//! let store = ConversationStore::new();
//! store.append("What is X?").unwrap();
//! store.resolve("X is Y", false).unwrap();
//!
//! let messages = store.messages();
//! assert_eq!(messages.len(), 1);
//! assert_eq!(messages[0].state, MessageState::Resolved);
//! ```

mod query;
mod store;

pub use query::{AskOutcome, QueryCoordinator, QueryState};
pub use store::{ConversationStore, Message, MessageState};
