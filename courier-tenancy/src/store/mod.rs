//! In-memory handlers for every tenancy message.
//!
//! [`MemoryStore`] keeps tenants, users and verification keys in concurrent
//! maps. Uniqueness (subdomain, email per tenant, provider identity per
//! tenant) is decided through map entries, so two racing requests cannot
//! both claim the same value.

mod tenants;
mod users;
mod verification;

use crate::models::{EmailVerification, Tenant, TenantId, User, UserId};
use courier_bus::{RegistryBuilder, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Shared in-memory state; clones share the same maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tenants: DashMap<TenantId, Tenant>,
    /// lower-cased subdomain -> tenant
    subdomains: DashMap<String, TenantId>,
    /// lower-cased cname -> tenant
    cnames: DashMap<String, TenantId>,
    users: DashMap<UserId, User>,
    /// (tenant, lower-cased email) -> user
    emails: DashMap<(TenantId, String), UserId>,
    /// (tenant, provider name, provider uid) -> user
    providers: DashMap<(TenantId, String, String), UserId>,
    verifications: DashMap<(TenantId, String), EmailVerification>,
    next_tenant_id: AtomicI64,
    next_user_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this store as the handler of every tenancy message.
    pub fn register(&self, builder: &mut RegistryBuilder) -> Result<()> {
        use crate::{cmd::*, query::*};

        builder
            .register::<CreateTenant, _>(self.clone())?
            .register::<ActivateTenant, _>(self.clone())?
            .register::<UpdateTenantSettings, _>(self.clone())?
            .register::<UpdateTenantPrivacySettings, _>(self.clone())?
            .register::<UpdateTenantCreatePostsSettings, _>(self.clone())?
            .register::<UpdateTenantAdvancedSettings, _>(self.clone())?
            .register::<UpdateTenantBillingSettings, _>(self.clone())?
            .register::<GetTenantBySubdomain, _>(self.clone())?
            .register::<RegisterUser, _>(self.clone())?
            .register::<RegisterUserProvider, _>(self.clone())?
            .register::<ChangeUserRole, _>(self.clone())?
            .register::<DeleteCurrentUser, _>(self.clone())?
            .register::<GetAllUsers, _>(self.clone())?
            .register::<GetUserByEmail, _>(self.clone())?
            .register::<GetUserByProvider, _>(self.clone())?
            .register::<GetUserById, _>(self.clone())?
            .register::<SaveVerificationKey, _>(self.clone())?
            .register::<SetKeyAsVerified, _>(self.clone())?
            .register::<GetVerificationByKey, _>(self.clone())?;
        Ok(())
    }

    pub fn tenant_count(&self) -> usize {
        self.inner.tenants.len()
    }

    pub fn user_count(&self) -> usize {
        self.inner.users.len()
    }

    fn next_tenant_id(&self) -> TenantId {
        self.inner.next_tenant_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn next_user_id(&self) -> UserId {
        self.inner.next_user_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tenants", &self.inner.tenants.len())
            .field("users", &self.inner.users.len())
            .field("verifications", &self.inner.verifications.len())
            .finish()
    }
}

fn email_key(tenant_id: TenantId, email: &str) -> (TenantId, String) {
    (tenant_id, email.trim().to_lowercase())
}
