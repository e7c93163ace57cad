//! Start-up wiring: logging, handler registration and the dispatcher.

use crate::settings::Settings;
use courier_bus::{
    Dispatcher, Message, RegistryBuilder, RequestContext, RequestScope, Result, ResultExt,
};
use courier_log::WorkerGuard;
use tracing::info;

/// A started bus: the dispatcher plus what keeps logging alive.
pub struct Runtime {
    dispatcher: Dispatcher,
    settings: Settings,
    _log_guard: Option<WorkerGuard>,
}

impl Runtime {
    /// Install logging, let `register` fill the registry, then freeze it.
    ///
    /// A duplicate registration fails start-up. Logging is skipped quietly
    /// when a global subscriber is already installed.
    pub fn start<F>(settings: Settings, register: F) -> Result<Self>
    where
        F: FnOnce(&mut RegistryBuilder) -> Result<()>,
    {
        let log_guard = settings.log_config().init();

        let mut builder = RegistryBuilder::new();
        register(&mut builder).wrap_err("registering handlers")?;
        let registry = builder.build();

        let dispatcher = if settings.hot_registration {
            Dispatcher::with_hot_registration(registry, settings.dispatch.clone())
        } else {
            Dispatcher::with_config(registry, settings.dispatch.clone())
        };

        info!(
            handlers = dispatcher.message_names().len(),
            hot_registration = settings.hot_registration,
            abort_on_cancel = settings.dispatch.abort_on_cancel,
            "Courier runtime started"
        );

        Ok(Self {
            dispatcher,
            settings,
            _log_guard: log_guard,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open a request scope, with the configured request timeout if any.
    pub fn begin_request(&self) -> RequestScope {
        match self.settings.dispatch.request_timeout_duration() {
            Some(timeout) => RequestScope::with_timeout(timeout),
            None => RequestScope::begin(),
        }
    }

    pub async fn dispatch<M: Message>(&self, ctx: &RequestContext, message: M) -> Result<M::Result> {
        self.dispatcher.dispatch(ctx, message).await
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("dispatcher", &self.dispatcher)
            .field("settings", &self.settings)
            .finish()
    }
}
