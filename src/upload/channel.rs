//! One-shot ingestion notification channel.
//!
//! A channel subscribes to the backend's push stream for one correlation id
//! and waits for exactly one terminal event: the `"completed"` payload or a
//! transport failure. It never reconnects. Once closed it stays closed.

use std::sync::{Arc, Weak};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::CorrelationId;
use crate::backend::{Backend, COMPLETED_PAYLOAD};
use crate::error::{Error, SessionError};

/// Why a channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The `"completed"` payload arrived.
    Completed,
    /// The stream failed or ended early.
    Errored,
    /// The owning session closed it.
    Teardown,
}

/// Connection state of a [`NotificationChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ChannelState {
    /// Subscription request in flight.
    Connecting,
    /// Subscribed and waiting for a terminal event.
    Open,
    /// Terminal. Never left.
    Closed(CloseReason),
}

impl ChannelState {
    /// Whether the subscription is still live.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Closed(_))
    }
}

/// Terminal result reported to the channel's owner.
#[derive(Debug)]
pub enum IngestionOutcome {
    /// The backend finished ingesting the document.
    Completed,
    /// The status stream failed.
    Failed(SessionError),
}

/// Receives the single terminal outcome of a channel.
pub trait IngestionListener: Send + Sync {
    /// Called once, after the channel has closed its subscription.
    fn ingestion_finished(&self, correlation_id: CorrelationId, outcome: IngestionOutcome);
}

/// Push subscription for one correlation id.
///
/// Created open (connecting) by [`NotificationChannel::open`]. Dropping the
/// channel closes it.
#[derive(Debug)]
pub struct NotificationChannel {
    correlation_id: CorrelationId,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl NotificationChannel {
    /// Subscribe to the ingestion stream for `correlation_id`.
    ///
    /// The listener is held weakly; if it is gone when the terminal event
    /// arrives, the outcome is dropped.
    pub fn open(
        backend: Arc<dyn Backend>,
        correlation_id: CorrelationId,
        listener: Weak<dyn IngestionListener>,
    ) -> Self {
        let state = Arc::new(watch::Sender::new(ChannelState::Connecting));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            backend,
            correlation_id,
            Arc::clone(&state),
            cancel.clone(),
            listener,
        ));

        debug!(name: "channel.opened", correlation_id = %correlation_id, "Notification channel opened");

        Self {
            correlation_id,
            state,
            cancel,
            task,
        }
    }

    /// Correlation id this channel listens on.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Whether the subscription is still live.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Force the channel closed without reporting an outcome.
    ///
    /// Returns `true` if it was still open.
    pub fn close(&self) -> bool {
        let closed = close_with(&self.state, CloseReason::Teardown);
        self.cancel.cancel();
        self.task.abort();
        if closed {
            info!(name: "channel.closed", correlation_id = %self.correlation_id, "Notification channel closed on teardown");
        }
        closed
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Move to `Closed(reason)` unless already closed.
fn close_with(state: &watch::Sender<ChannelState>, reason: CloseReason) -> bool {
    state.send_if_modified(|current| {
        if current.is_open() {
            *current = ChannelState::Closed(reason);
            true
        } else {
            false
        }
    })
}

async fn run(
    backend: Arc<dyn Backend>,
    correlation_id: CorrelationId,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    listener: Weak<dyn IngestionListener>,
) {
    let subscribed = tokio::select! {
        () = cancel.cancelled() => return,
        res = backend.subscribe(&correlation_id) => res,
    };

    let result = match subscribed {
        Ok(mut stream) => {
            state.send_if_modified(|current| {
                if *current == ChannelState::Connecting {
                    *current = ChannelState::Open;
                    true
                } else {
                    false
                }
            });

            let result = loop {
                let item = tokio::select! {
                    () = cancel.cancelled() => return,
                    item = stream.next() => item,
                };
                match item {
                    Some(Ok(payload)) if payload == COMPLETED_PAYLOAD => break Ok(()),
                    Some(Ok(payload)) => {
                        debug!(correlation_id = %correlation_id, payload = %payload, "Ignoring notification payload");
                    }
                    Some(Err(e)) => break Err(e),
                    None => break Err(Error::StreamEnded),
                }
            };
            // Close the underlying subscription before reporting.
            drop(stream);
            result
        }
        Err(e) => Err(e),
    };

    let (reason, outcome) = match result {
        Ok(()) => (CloseReason::Completed, IngestionOutcome::Completed),
        Err(e) => {
            warn!(name: "channel.errored", correlation_id = %correlation_id, error = %e, "Notification stream failed");
            (
                CloseReason::Errored,
                IngestionOutcome::Failed(SessionError::Channel(e)),
            )
        }
    };

    if !close_with(&state, reason) {
        // Torn down while the terminal event was in flight.
        return;
    }
    if let Some(listener) = listener.upgrade() {
        listener.ingestion_finished(correlation_id, outcome);
    }
}
