//! Handler traits.

use crate::context::RequestContext;
use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Handles exactly one message type.
///
/// The context is the one the caller dispatched with, bound to the current
/// dispatcher so the handler can chain further dispatches through
/// [`RequestContext::dispatch`].
#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    /// Handle the message
    async fn handle(&self, ctx: &RequestContext, message: M) -> Result<M::Result>;
}

#[async_trait]
impl<M, H> Handler<M> for Arc<H>
where
    M: Message,
    H: Handler<M>,
{
    async fn handle(&self, ctx: &RequestContext, message: M) -> Result<M::Result> {
        self.as_ref().handle(ctx, message).await
    }
}

/// Handler backed by an async function.
///
/// Built with [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Turn `async fn(RequestContext, M) -> Result<M::Result>` into a handler.
///
/// ```rust
/// use courier_bus::{Error, Message, RegistryBuilder, RequestContext, handler_fn};
///
/// struct Ping;
///
/// impl Message for Ping {
///     type Result = &'static str;
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register::<Ping, _>(handler_fn(|_ctx: RequestContext, _msg: Ping| async {
///         Ok::<_, Error>("pong")
///     }))
///     .unwrap();
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

#[async_trait]
impl<M, F, Fut> Handler<M> for HandlerFn<F>
where
    M: Message,
    F: Fn(RequestContext, M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<M::Result>> + Send + 'static,
{
    async fn handle(&self, ctx: &RequestContext, message: M) -> Result<M::Result> {
        (self.f)(ctx.clone(), message).await
    }
}
