//! Message dispatcher.

use crate::config::DispatchConfig;
use crate::context::RequestContext;
use crate::error::{Error, ErrorClass, Result};
use crate::handler::Handler;
use crate::message::Message;
use crate::registry::HandlerRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, debug_span, error, warn};

enum Table {
    /// Built once, read without locking.
    Frozen(HandlerRegistry),
    /// Registration takes the write lock, resolution the read lock.
    Live(RwLock<HandlerRegistry>),
}

struct Inner {
    table: Table,
    config: DispatchConfig,
}

/// Routes messages to their handlers.
///
/// Cheap to clone; clones share the same registry.
///
/// ```rust
/// use courier_bus::{Dispatcher, Error, Message, RegistryBuilder, RequestScope};
///
/// struct Add(i32, i32);
///
/// impl Message for Add {
///     type Result = i32;
/// }
///
/// # tokio_test::block_on(async {
/// let mut registry = RegistryBuilder::new();
/// registry
///     .register_fn::<Add, _, _>(|_ctx, Add(a, b)| async move { Ok::<_, Error>(a + b) })
///     .unwrap();
/// let dispatcher = Dispatcher::new(registry.build());
///
/// let scope = RequestScope::begin();
/// assert_eq!(dispatcher.dispatch(&scope, Add(2, 3)).await.unwrap(), 5);
/// # });
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Dispatcher over a frozen registry with default settings.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::with_config(registry, DispatchConfig::default())
    }

    /// Dispatcher over a frozen registry.
    pub fn with_config(registry: HandlerRegistry, config: DispatchConfig) -> Self {
        Self::from_table(Table::Frozen(registry), config)
    }

    /// Dispatcher whose registry keeps accepting handlers after start-up.
    pub fn with_hot_registration(registry: HandlerRegistry, config: DispatchConfig) -> Self {
        Self::from_table(Table::Live(RwLock::new(registry)), config)
    }

    fn from_table(table: Table, config: DispatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner { table, config }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Whether [`register`](Self::register) is available.
    pub fn accepts_registration(&self) -> bool {
        matches!(self.inner.table, Table::Live(_))
    }

    /// Register a handler at runtime.
    ///
    /// Only a dispatcher built with
    /// [`with_hot_registration`](Self::with_hot_registration) accepts this;
    /// a frozen one returns [`Error::RegistryFrozen`].
    pub fn register<M, H>(&self, handler: H) -> Result<()>
    where
        M: Message,
        H: Handler<M>,
    {
        let result = match &self.inner.table {
            Table::Frozen(_) => Err(Error::RegistryFrozen(M::name())),
            Table::Live(lock) => lock.write().insert::<M, H>(handler),
        };
        if let Err(err) = &result {
            error!(message = M::name(), error = %err, "Handler registration rejected");
        }
        result
    }

    /// Look up the handler for `M`.
    pub fn resolve<M: Message>(&self) -> Result<Arc<dyn Handler<M>>> {
        match &self.inner.table {
            Table::Frozen(registry) => registry.resolve::<M>(),
            Table::Live(lock) => lock.read().resolve::<M>(),
        }
    }

    pub fn is_registered<M: Message>(&self) -> bool {
        match &self.inner.table {
            Table::Frozen(registry) => registry.contains::<M>(),
            Table::Live(lock) => lock.read().contains::<M>(),
        }
    }

    /// Names of every message type with a handler.
    pub fn message_names(&self) -> Vec<&'static str> {
        match &self.inner.table {
            Table::Frozen(registry) => registry.message_names(),
            Table::Live(lock) => lock.read().message_names(),
        }
    }

    /// Resolve the handler for `message` and run it under `ctx`.
    ///
    /// The handler's error is returned unchanged. A context that is already
    /// done short-circuits with its cancellation-class error.
    pub async fn dispatch<M: Message>(&self, ctx: &RequestContext, message: M) -> Result<M::Result> {
        let name = M::name();
        let handler = match self.resolve::<M>() {
            Ok(handler) => handler,
            Err(err) => {
                error!(message = name, error = %err, "Dispatch failed, no handler registered");
                return Err(err);
            }
        };

        if let Some(err) = ctx.err() {
            debug!(message = name, error = %err, "Context done before dispatch");
            return Err(err);
        }

        let ctx = ctx.bind(self);
        let span = debug_span!(
            "dispatch",
            message = name,
            request_id = ctx.request_id().unwrap_or_default(),
            tenant = ctx.tenant_id().unwrap_or_default(),
        );

        let started = Instant::now();
        let outcome = self
            .invoke(handler.as_ref(), &ctx, message)
            .instrument(span)
            .await;
        self.report(name, &outcome, started.elapsed());
        outcome
    }

    async fn invoke<M: Message>(
        &self,
        handler: &dyn Handler<M>,
        ctx: &RequestContext,
        message: M,
    ) -> Result<M::Result> {
        if !self.inner.config.abort_on_cancel {
            return handler.handle(ctx, message).await;
        }

        tokio::select! {
            result = handler.handle(ctx, message) => result,
            err = ctx.done() => {
                debug!(error = %err, "Handler dropped, context done");
                Err(err)
            }
        }
    }

    fn report<T>(&self, name: &'static str, outcome: &Result<T>, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed > self.inner.config.slow_threshold() {
            warn!(message = name, elapsed_ms, "Slow dispatch");
        }

        let err = match outcome {
            Ok(_) => {
                debug!(message = name, elapsed_ms, "Dispatched");
                return;
            }
            Err(err) => err,
        };

        let kind = err.kind();
        match kind.class() {
            ErrorClass::Domain | ErrorClass::Cancellation => {
                debug!(message = name, kind = kind.as_str(), error = %err, "Dispatch returned error");
            }
            ErrorClass::Configuration | ErrorClass::Unexpected => {
                error!(message = name, kind = kind.as_str(), error = %err, "Dispatch failed");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("messages", &self.message_names())
            .field("hot_registration", &self.accepts_registration())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestScope;
    use crate::error::ErrorKind;
    use crate::registry::RegistryBuilder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo(String);

    impl Message for Echo {
        type Result = String;
    }

    struct Missing;

    impl Message for Missing {
        type Result = u32;
    }

    struct Shout(String);

    impl Message for Shout {
        type Result = String;
    }

    struct Failing;

    impl Message for Failing {
        type Result = ();
    }

    struct Spin;

    impl Message for Spin {
        type Result = usize;
    }

    struct EchoHandler;

    #[async_trait]
    impl Handler<Echo> for EchoHandler {
        async fn handle(&self, _ctx: &RequestContext, message: Echo) -> Result<String> {
            Ok(message.0)
        }
    }

    struct ShoutHandler;

    #[async_trait]
    impl Handler<Shout> for ShoutHandler {
        async fn handle(&self, ctx: &RequestContext, message: Shout) -> Result<String> {
            let echoed = ctx.dispatch(Echo(message.0)).await?;
            Ok(echoed.to_uppercase())
        }
    }

    struct SpinHandler {
        iterations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler<Spin> for SpinHandler {
        async fn handle(&self, ctx: &RequestContext, _message: Spin) -> Result<usize> {
            loop {
                ctx.check()?;
                self.iterations.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut builder = RegistryBuilder::new();
        builder
            .register::<Echo, _>(EchoHandler)
            .unwrap()
            .register::<Shout, _>(ShoutHandler)
            .unwrap()
            .register_fn::<Failing, _, _>(|_ctx, _msg| async {
                Err(Error::NotFound.wrap("loading row").wrap("failing handler"))
            })
            .unwrap();
        Dispatcher::new(builder.build())
    }

    #[tokio::test]
    async fn test_dispatch_returns_result() {
        let bus = dispatcher();
        let scope = RequestScope::begin();

        let result = bus.dispatch(&scope, Echo("hello".into())).await.unwrap();
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn test_unregistered_message_is_configuration_error() {
        let bus = dispatcher();
        let scope = RequestScope::begin();

        let err = bus.dispatch(&scope, Missing).await.unwrap_err();
        assert!(matches!(err, Error::NotRegistered("Missing")));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[tokio::test]
    async fn test_handler_error_propagates_unchanged() {
        let bus = dispatcher();
        let scope = RequestScope::begin();

        let err = bus.dispatch(&scope, Failing).await.unwrap_err();
        assert_eq!(err.to_string(), "failing handler: loading row: not found");
        assert!(matches!(err.cause(), Error::NotFound));
    }

    #[tokio::test]
    async fn test_chained_dispatch_on_same_context() {
        let bus = dispatcher();
        let scope = RequestScope::begin();

        let result = bus.dispatch(&scope, Shout("hi".into())).await.unwrap();
        assert_eq!(result, "HI");
    }

    #[tokio::test]
    async fn test_done_context_short_circuits() {
        let bus = dispatcher();
        let scope = RequestScope::begin();
        scope.cancel();

        let err = bus.dispatch(&scope, Echo("late".into())).await.unwrap_err();
        assert!(err.is(ErrorKind::Canceled));
    }

    #[tokio::test]
    async fn test_polling_handler_stops_on_cancel() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let mut builder = RegistryBuilder::new();
        builder
            .register::<Spin, _>(SpinHandler {
                iterations: iterations.clone(),
            })
            .unwrap();
        let bus = Dispatcher::new(builder.build());

        let scope = RequestScope::begin();
        let ctx = scope.context().clone();
        let task = tokio::spawn({
            let bus = bus.clone();
            async move { bus.dispatch(&ctx, Spin).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        scope.finish();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("handler did not observe cancellation")
            .unwrap();
        assert!(result.unwrap_err().is(ErrorKind::Canceled));
        assert!(iterations.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_abort_on_cancel_drops_handler() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_fn::<Spin, _, _>(|_ctx, _msg| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(0)
            })
            .unwrap();
        let config = DispatchConfig::new().abort_on_cancel(true);
        let bus = Dispatcher::with_config(builder.build(), config);

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
        let err = tokio::time::timeout(Duration::from_secs(1), bus.dispatch(&ctx, Spin))
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is(ErrorKind::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_frozen_dispatcher_rejects_registration() {
        let bus = dispatcher();
        assert!(!bus.accepts_registration());

        let handler = crate::handler_fn(|_ctx: RequestContext, _msg: Missing| async {
            Ok::<u32, Error>(1)
        });
        let err = bus.register::<Missing, _>(handler);
        assert!(matches!(err, Err(Error::RegistryFrozen("Missing"))));
    }

    #[tokio::test]
    async fn test_hot_registration() {
        let bus = Dispatcher::with_hot_registration(HandlerRegistry::default(), DispatchConfig::default());
        let scope = RequestScope::begin();

        assert!(bus.dispatch(&scope, Echo("x".into())).await.is_err());

        bus.register::<Echo, _>(EchoHandler).unwrap();
        assert!(bus.is_registered::<Echo>());
        assert_eq!(bus.dispatch(&scope, Echo("x".into())).await.unwrap(), "x");

        let err = bus.register::<Echo, _>(EchoHandler).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered("Echo")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hot_registration_while_dispatching() {
        let mut builder = RegistryBuilder::new();
        builder.register::<Echo, _>(EchoHandler).unwrap();
        let bus = Dispatcher::with_hot_registration(builder.build(), DispatchConfig::default());

        let mut readers = Vec::new();
        for i in 0..8 {
            let bus = bus.clone();
            readers.push(tokio::spawn(async move {
                let scope = RequestScope::begin();
                let mut shouted = None;
                for _ in 0..200 {
                    let echoed = bus.dispatch(&scope, Echo(format!("r{i}"))).await?;
                    assert_eq!(echoed, format!("r{i}"));
                    match bus.dispatch(&scope, Shout(format!("r{i}"))).await {
                        Ok(result) => shouted = Some(result),
                        Err(err) => assert!(err.is(ErrorKind::NotRegistered)),
                    }
                    tokio::task::yield_now().await;
                }
                Ok::<_, Error>(shouted)
            }));
        }

        // Racing registrations of one type: exactly one wins
        let mut writers = Vec::new();
        for _ in 0..4 {
            let bus = bus.clone();
            writers.push(tokio::spawn(async move { bus.register::<Shout, _>(ShoutHandler) }));
        }
        let mut registered = 0;
        for writer in writers {
            match writer.await.unwrap() {
                Ok(()) => registered += 1,
                Err(err) => assert!(matches!(err, Error::AlreadyRegistered("Shout"))),
            }
        }
        assert_eq!(registered, 1);

        for (i, reader) in readers.into_iter().enumerate() {
            if let Some(shouted) = reader.await.unwrap().unwrap() {
                assert_eq!(shouted, format!("R{i}"));
            }
        }

        let scope = RequestScope::begin();
        assert_eq!(bus.dispatch(&scope, Shout("done".into())).await.unwrap(), "DONE");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_across_requests() {
        let bus = dispatcher();
        let mut tasks = Vec::new();

        for i in 0..64 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                let scope = RequestScope::begin();
                bus.dispatch(&scope, Shout(format!("msg-{}", i))).await
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), format!("MSG-{}", i));
        }
    }
}
