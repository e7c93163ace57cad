//! Testing utilities for code built on the Courier bus.
//!
//! - [`RecordingHandler`] - records messages and replies from a script
//! - [`SpyHandler`] - counts calls to a real handler
//! - [`test_context`] - a request context with a tenant and an administrator
//!
//! ```rust,ignore
//! use courier_testing::*;
//!
//! #[tokio::test]
//! async fn sends_welcome_mail() {
//!     let mailer = RecordingHandler::<SendMail>::responding(|_| Ok(()));
//!     let mut builder = RegistryBuilder::new();
//!     builder.register::<SendMail, _>(mailer.clone())?;
//!     // ... dispatch the workflow under test_context()
//!     assert_eq!(mailer.call_count(), 1);
//! }
//! ```

pub mod mock;

pub use mock::{RecordingHandler, SpyHandler};

use courier_bus::{RequestContext, keys};
use courier_tenancy::{Role, TenancyContextExt, Tenant, TenantStatus, User};

/// Active tenant `demo` with id 1.
pub fn test_tenant() -> Tenant {
    Tenant::new(1, "Demo", "demo").with_status(TenantStatus::Active)
}

/// Administrator of [`test_tenant`] with id 1.
pub fn test_admin() -> User {
    let mut user = User::new("Jon Snow", "jon.snow@example.com").with_role(Role::Administrator);
    user.id = 1;
    user.tenant_id = 1;
    user
}

/// Context carrying a request id, [`test_tenant`] and [`test_admin`].
pub fn test_context() -> RequestContext {
    test_context_for(test_tenant(), Some(test_admin()))
}

pub fn test_context_for(tenant: Tenant, user: Option<User>) -> RequestContext {
    let ctx = RequestContext::new()
        .with_value(keys::REQUEST_ID, uuid::Uuid::new_v4().to_string())
        .with_tenant(tenant);
    match user {
        Some(user) => ctx.with_user(user),
        None => ctx,
    }
}
