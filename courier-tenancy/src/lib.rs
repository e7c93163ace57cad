//! Tenant and user messages for the Courier bus.
//!
//! - [`cmd`] - commands (create tenant, register user, change role, ...)
//! - [`query`] - queries (users by email/provider/id, tenant by subdomain)
//! - [`MemoryStore`] - in-memory handlers for all of them
//! - [`CreateUserHandler`] - find-or-create workflow chained over the bus
//! - [`TenancyContextExt`] - tenant, user and locale on a request context
//!
//! ```rust,ignore
//! use courier_bus::{Dispatcher, RegistryBuilder, RequestContext};
//! use courier_tenancy::{MemoryStore, TenancyContextExt, cmd::CreateTenant};
//!
//! let store = MemoryStore::new();
//! let mut builder = RegistryBuilder::new();
//! courier_tenancy::register(&mut builder, &store)?;
//! let dispatcher = Dispatcher::new(builder.build());
//!
//! let tenant = dispatcher
//!     .dispatch(&RequestContext::new(), CreateTenant { .. })
//!     .await?;
//! let ctx = RequestContext::new().with_tenant(tenant);
//! ```

macro_rules! command {
    ($message:ty => $result:ty) => {
        impl courier_bus::Message for $message {
            type Result = $result;
        }

        impl courier_bus::Command for $message {}
    };
}

macro_rules! query {
    ($message:ty => $result:ty) => {
        impl courier_bus::Message for $message {
            type Result = $result;
        }

        impl courier_bus::Query for $message {}
    };
}

pub mod cmd;
pub mod context;
pub mod models;
pub mod query;
pub mod store;
pub mod workflow;

pub use context::TenancyContextExt;
pub use models::{
    EmailVerification, Role, Tenant, TenantBilling, TenantId, TenantStatus, User, UserId,
    UserProvider,
};
pub use store::MemoryStore;
pub use workflow::{CreateUserHandler, REFERENCE_PROVIDER};

use courier_bus::{RegistryBuilder, Result};

/// Register every tenancy handler: the store's plus the workflows.
pub fn register(builder: &mut RegistryBuilder, store: &MemoryStore) -> Result<()> {
    store.register(builder)?;
    builder.register::<cmd::CreateUser, _>(CreateUserHandler)?;
    Ok(())
}
