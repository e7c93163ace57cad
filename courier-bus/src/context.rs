//! Request-scoped context.
//!
//! A [`RequestContext`] is created once per inbound request (see
//! [`RequestScope`]) and passed by reference to every dispatch that request
//! makes. It carries:
//!
//! - an immutable chain of string-keyed values (tenant, user, locale, ...)
//! - a cancellation token shared by every clone of the context
//! - an optional deadline
//!
//! Deriving a context ([`RequestContext::with_value`],
//! [`RequestContext::with_timeout`], [`RequestContext::child`]) never touches
//! the parent. The derived context listens to the parent's cancellation, but
//! canceling the derived context leaves the parent running.
//!
//! ```rust
//! use courier_bus::RequestContext;
//!
//! let root = RequestContext::new().with_value("locale", "en".to_string());
//! let child = root.with_value("locale", "pt-BR".to_string());
//!
//! assert_eq!(root.value::<String>("locale").unwrap(), "en");
//! assert_eq!(child.value::<String>("locale").unwrap(), "pt-BR");
//!
//! child.cancel();
//! assert!(child.is_cancelled());
//! assert!(!root.is_cancelled());
//! ```

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::message::Message;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Keys under which the request boundary stores well-known values.
pub mod keys {
    /// The resolved tenant record.
    pub const TENANT: &str = "tenant";
    /// The tenant id as a `String`, used for log fields.
    pub const TENANT_ID: &str = "tenant_id";
    /// The authenticated user.
    pub const USER: &str = "user";
    /// Preferred locale as a `String`.
    pub const LOCALE: &str = "locale";
    /// Request id as a `String`.
    pub const REQUEST_ID: &str = "request_id";
}

struct Binding {
    key: Cow<'static, str>,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Binding>>,
}

/// Carrier of identity, cancellation and deadline for one request.
#[derive(Clone)]
pub struct RequestContext {
    bindings: Option<Arc<Binding>>,
    token: CancellationToken,
    deadline: Option<Instant>,
    dispatcher: Option<Dispatcher>,
}

impl RequestContext {
    /// Create a root context with no values, no deadline and a fresh token.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            bindings: None,
            token,
            deadline: None,
            dispatcher: None,
        }
    }

    fn derive(&self) -> Self {
        Self {
            bindings: self.bindings.clone(),
            token: self.token.child_token(),
            deadline: self.deadline,
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Derive a context that maps `key` to `value`.
    pub fn with_value<T>(&self, key: impl Into<Cow<'static, str>>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        let mut derived = self.derive();
        derived.bindings = Some(Arc::new(Binding {
            key: key.into(),
            value: Arc::new(value),
            parent: self.bindings.clone(),
        }));
        derived
    }

    /// Look up `key`, newest binding first.
    ///
    /// Returns `None` when the key is absent or when its newest binding holds
    /// a different type.
    pub fn value<T: 'static>(&self, key: &str) -> Option<&T> {
        self.binding(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Like [`value`](Self::value) but returns a shared handle.
    pub fn value_arc<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.binding(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Check whether any binding exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.binding(key).is_some()
    }

    fn binding(&self, key: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
        let mut node = self.bindings.as_deref();
        while let Some(binding) = node {
            if binding.key == key {
                return Some(&binding.value);
            }
            node = binding.parent.as_deref();
        }
        None
    }

    /// Request id, if the boundary assigned one.
    pub fn request_id(&self) -> Option<&str> {
        self.value::<String>(keys::REQUEST_ID).map(String::as_str)
    }

    /// Tenant id, if a tenant was resolved for this request.
    pub fn tenant_id(&self) -> Option<&str> {
        self.value::<String>(keys::TENANT_ID).map(String::as_str)
    }

    /// Derive a context with its own cancellation, e.g. for a fan-out branch.
    pub fn child(&self) -> Self {
        self.derive()
    }

    /// Derive a context that expires at `deadline`, or at the parent's
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut derived = self.derive();
        derived.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        derived
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fire cancellation for this context and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context is done: canceled or past its deadline.
    ///
    /// Same condition as [`err`](Self::err) returning `Some`.
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<Error> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(Error::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(Error::Canceled)
        } else {
            None
        }
    }

    /// `Err` with the cancellation-class error once the context is done.
    ///
    /// Long-running handlers call this between units of work.
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolve once the context is canceled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
        self.err().unwrap_or(Error::Canceled)
    }

    pub(crate) fn bind(&self, dispatcher: &Dispatcher) -> Self {
        let mut derived = self.derive();
        derived.dispatcher = Some(dispatcher.clone());
        derived
    }

    /// The dispatcher currently serving this context, if any.
    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Dispatch a further message on the same request.
    ///
    /// Only available inside a handler, where the context is bound to the
    /// dispatcher that invoked it; elsewhere returns [`Error::Unbound`].
    pub async fn dispatch<M: Message>(&self, message: M) -> Result<M::Result> {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(self, message).await,
            None => Err(Error::Unbound),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut node = self.bindings.as_deref();
        while let Some(binding) = node {
            keys.push(binding.key.as_ref());
            node = binding.parent.as_deref();
        }
        f.debug_struct("RequestContext")
            .field("keys", &keys)
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .field("bound", &self.dispatcher.is_some())
            .finish()
    }
}

/// Owns the context of one request.
///
/// Dropping the scope fires cancellation for the request context and every
/// context derived from it, on every exit path including early returns and
/// panics.
pub struct RequestScope {
    context: RequestContext,
    _guard: DropGuard,
}

impl RequestScope {
    /// Open a scope with a fresh request id and no deadline.
    pub fn begin() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        let context = RequestContext::with_token(token)
            .with_value(keys::REQUEST_ID, Uuid::new_v4().to_string());
        Self {
            context,
            _guard: guard,
        }
    }

    /// Open a scope whose context expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut scope = Self::begin();
        scope.context = scope.context.with_timeout(timeout);
        scope
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn request_id(&self) -> &str {
        self.context.request_id().unwrap_or_default()
    }

    /// Release the request. Equivalent to dropping the scope.
    pub fn finish(self) {}
}

impl Deref for RequestScope {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.context
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("context", &self.context)
            .finish()
    }
}
