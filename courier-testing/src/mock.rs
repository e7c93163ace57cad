// Recording and spy handlers

use async_trait::async_trait;
use courier_bus::{Error, Handler, Message, RequestContext, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Responder<M> = Arc<dyn Fn(&M) -> Result<<M as Message>::Result> + Send + Sync>;

/// Handler that records every message it receives.
///
/// Replies come from the scripted queue first, then from the responder.
/// With neither, the call fails with an unexpected error naming the message.
pub struct RecordingHandler<M: Message> {
    calls: Arc<Mutex<Vec<M>>>,
    replies: Arc<Mutex<VecDeque<Result<M::Result>>>>,
    responder: Option<Responder<M>>,
}

impl<M: Message> RecordingHandler<M> {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            responder: None,
        }
    }

    /// Answer every unscripted call with `f`.
    pub fn responding(f: impl Fn(&M) -> Result<M::Result> + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Arc::new(f)),
            ..Self::new()
        }
    }

    /// Queue a reply for the next call.
    pub fn reply(&self, reply: Result<M::Result>) -> &Self {
        self.replies.lock().push_back(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// Recorded messages, oldest first.
    pub fn calls(&self) -> Vec<M>
    where
        M: Clone,
    {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> Option<M>
    where
        M: Clone,
    {
        self.calls.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
        self.replies.lock().clear();
    }
}

impl<M: Message> Clone for RecordingHandler<M> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
            replies: Arc::clone(&self.replies),
            responder: self.responder.clone(),
        }
    }
}

impl<M: Message> Default for RecordingHandler<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message> Handler<M> for RecordingHandler<M> {
    async fn handle(&self, _ctx: &RequestContext, message: M) -> Result<M::Result> {
        let scripted = self.replies.lock().pop_front();
        let reply = match (scripted, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(&message),
            (None, None) => Err(Error::other(format!("no reply scripted for {}", M::name()))),
        };
        self.calls.lock().push(message);
        reply
    }
}

/// Wraps a real handler and counts its invocations.
pub struct SpyHandler<H> {
    inner: Arc<H>,
    calls: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl<H> SpyHandler<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that returned an error
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H> Clone for SpyHandler<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            calls: Arc::clone(&self.calls),
            failures: Arc::clone(&self.failures),
        }
    }
}

#[async_trait]
impl<M, H> Handler<M> for SpyHandler<H>
where
    M: Message,
    H: Handler<M>,
{
    async fn handle(&self, ctx: &RequestContext, message: M) -> Result<M::Result> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.handle(ctx, message).await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}
