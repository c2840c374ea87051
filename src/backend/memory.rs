//! Scripted in-process backend.
//!
//! Replies are queued ahead of time, either ready or deferred behind a
//! oneshot sender so a caller can observe the in-flight state before the
//! reply is released. Push events are delivered per correlation id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Backend, PushStream};
use crate::error::{Error, Result};
use crate::upload::{CorrelationId, SelectedFile};

/// A queued reply.
#[derive(Debug)]
enum Reply<T> {
    Ready(Result<T>),
    Deferred(oneshot::Receiver<Result<T>>),
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T> {
        match self {
            Self::Ready(result) => result,
            Self::Deferred(rx) => rx
                .await
                .unwrap_or_else(|_| Err(Error::Unavailable("reply dropped".into()))),
        }
    }
}

/// A document received by [`InMemoryBackend::upload_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    /// File name of the `file` part.
    pub file_name: String,
    /// Size of the file contents.
    pub size: usize,
    /// Value of the `upload_id` field.
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Default)]
struct Inner {
    upload_replies: VecDeque<Reply<()>>,
    ask_replies: VecDeque<Reply<String>>,
    subscribe_failures: VecDeque<Error>,
    uploads: Vec<RecordedUpload>,
    questions: Vec<String>,
    subscriptions: HashMap<CorrelationId, Vec<mpsc::UnboundedSender<Result<String>>>>,
}

/// In-memory [`Backend`] driven by scripted replies.
///
/// Uploads succeed unless a reply was queued. Questions fail unless an
/// answer was queued.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
}

impl InMemoryBackend {
    /// Create a backend with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result of the next upload.
    pub fn push_upload_result(&self, result: Result<()>) {
        self.lock().upload_replies.push_back(Reply::Ready(result));
    }

    /// Hold the next upload until the returned sender fires.
    pub fn defer_upload(&self) -> oneshot::Sender<Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.lock().upload_replies.push_back(Reply::Deferred(rx));
        tx
    }

    /// Queue the next answer.
    pub fn push_answer(&self, answer: impl Into<String>) {
        self.lock()
            .ask_replies
            .push_back(Reply::Ready(Ok(answer.into())));
    }

    /// Queue a failure for the next question.
    pub fn push_ask_error(&self, error: Error) {
        self.lock().ask_replies.push_back(Reply::Ready(Err(error)));
    }

    /// Hold the next answer until the returned sender fires.
    pub fn defer_answer(&self) -> oneshot::Sender<Result<String>> {
        let (tx, rx) = oneshot::channel();
        self.lock().ask_replies.push_back(Reply::Deferred(rx));
        tx
    }

    /// Make the next subscription request fail.
    pub fn fail_next_subscribe(&self, error: Error) {
        self.lock().subscribe_failures.push_back(error);
    }

    /// Deliver a payload to every live subscriber of `correlation_id`.
    ///
    /// Returns how many subscribers received it.
    pub fn push_event(&self, correlation_id: &CorrelationId, payload: impl Into<String>) -> usize {
        let payload = payload.into();
        self.broadcast(correlation_id, || Ok(payload.clone()))
    }

    /// Deliver a transport error to every live subscriber of `correlation_id`.
    pub fn push_stream_error(&self, correlation_id: &CorrelationId, message: &str) -> usize {
        self.broadcast(correlation_id, || {
            Err(Error::Unavailable(message.to_string()))
        })
    }

    /// End every stream of `correlation_id` without a terminal event.
    pub fn end_streams(&self, correlation_id: &CorrelationId) {
        self.lock().subscriptions.remove(correlation_id);
    }

    fn broadcast(
        &self,
        correlation_id: &CorrelationId,
        item: impl Fn() -> Result<String>,
    ) -> usize {
        let mut inner = self.lock();
        let Some(senders) = inner.subscriptions.get_mut(correlation_id) else {
            return 0;
        };
        senders.retain(|tx| !tx.is_closed());
        senders.iter().filter(|tx| tx.send(item()).is_ok()).count()
    }

    /// Uploads received so far.
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.lock().uploads.clone()
    }

    /// Questions received so far.
    pub fn questions(&self) -> Vec<String> {
        self.lock().questions.clone()
    }

    /// Number of subscriptions for `correlation_id` whose receiver is still alive.
    pub fn open_subscriptions(&self, correlation_id: &CorrelationId) -> usize {
        self.lock()
            .subscriptions
            .get(correlation_id)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    async fn upload_document(
        &self,
        file: &SelectedFile,
        correlation_id: &CorrelationId,
    ) -> Result<()> {
        let reply = {
            let mut inner = self.lock();
            inner.uploads.push(RecordedUpload {
                file_name: file.name().to_string(),
                size: file.len(),
                correlation_id: *correlation_id,
            });
            inner.upload_replies.pop_front()
        };
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(()),
        }
    }

    async fn subscribe(&self, correlation_id: &CorrelationId) -> Result<PushStream> {
        let mut inner = self.lock();
        if let Some(error) = inner.subscribe_failures.pop_front() {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner
            .subscriptions
            .entry(*correlation_id)
            .or_default()
            .push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let reply = {
            let mut inner = self.lock();
            inner.questions.push(question.to_string());
            inner.ask_replies.pop_front()
        };
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(Error::Unavailable("no answer scripted".into())),
        }
    }
}
