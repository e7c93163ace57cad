// Courier - in-process command/query dispatch for multi-tenant backends
//
// Re-exports the bus, configuration and logging crates and adds the start-up
// wiring that ties them together.

mod runtime;
mod settings;

pub use runtime::Runtime;
pub use settings::Settings;

// Re-export the bus
pub use courier_bus::*;

pub use courier_config;
pub use courier_log;

#[cfg(feature = "tenancy")]
pub use courier_tenancy;

#[cfg(feature = "testing")]
pub use courier_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Command,
        DispatchConfig,
        Dispatcher,
        Error,
        ErrorKind,
        Handler,
        Message,
        Query,
        RegistryBuilder,
        RequestContext,
        RequestScope,
        Result,
        ResultExt,
        Runtime,
        Settings,
        cause,
        handler_fn,
        keys,
        wrap,
    };

    #[cfg(feature = "tenancy")]
    pub use courier_tenancy::TenancyContextExt;

    pub use async_trait::async_trait;
}
