//! Typed tenant, user and locale access on a [`RequestContext`].

use crate::models::{Tenant, User};
use courier_bus::{Error, RequestContext, Result, keys};

const DEFAULT_LOCALE: &str = "en";

/// Tenancy accessors for the request context.
///
/// The request boundary attaches the resolved tenant and the signed-in user;
/// handlers read them back through these methods.
pub trait TenancyContextExt {
    /// Bind `tenant`, also setting the `tenant_id` key used in logs.
    fn with_tenant(&self, tenant: Tenant) -> RequestContext;

    fn with_user(&self, user: User) -> RequestContext;

    fn with_locale(&self, locale: impl Into<String>) -> RequestContext;

    fn tenant(&self) -> Option<&Tenant>;

    fn user(&self) -> Option<&User>;

    /// Explicit locale, else the tenant's, else `en`.
    fn locale(&self) -> &str;

    /// The tenant, or [`Error::Forbidden`] when none was resolved.
    fn require_tenant(&self) -> Result<&Tenant> {
        self.tenant()
            .ok_or_else(|| Error::Forbidden.wrap("no tenant in request context"))
    }

    /// The signed-in user, or [`Error::Forbidden`].
    fn require_user(&self) -> Result<&User> {
        self.user()
            .ok_or_else(|| Error::Forbidden.wrap("no user in request context"))
    }

    /// A signed-in administrator of the tenant in context.
    fn require_admin(&self) -> Result<(&Tenant, &User)> {
        let tenant = self.require_tenant()?;
        let user = self.require_user()?;
        if user.tenant_id != tenant.id || !user.is_administrator() {
            return Err(Error::Forbidden.wrap(format!(
                "user {} is not an administrator of {}",
                user.id, tenant.subdomain
            )));
        }
        Ok((tenant, user))
    }
}

impl TenancyContextExt for RequestContext {
    fn with_tenant(&self, tenant: Tenant) -> RequestContext {
        let id = tenant.id.to_string();
        self.with_value(keys::TENANT, tenant)
            .with_value(keys::TENANT_ID, id)
    }

    fn with_user(&self, user: User) -> RequestContext {
        self.with_value(keys::USER, user)
    }

    fn with_locale(&self, locale: impl Into<String>) -> RequestContext {
        self.with_value(keys::LOCALE, locale.into())
    }

    fn tenant(&self) -> Option<&Tenant> {
        self.value::<Tenant>(keys::TENANT)
    }

    fn user(&self) -> Option<&User> {
        self.value::<User>(keys::USER)
    }

    fn locale(&self) -> &str {
        self.value::<String>(keys::LOCALE)
            .map(String::as_str)
            .or_else(|| self.tenant().map(|t| t.locale.as_str()))
            .unwrap_or(DEFAULT_LOCALE)
    }
}
