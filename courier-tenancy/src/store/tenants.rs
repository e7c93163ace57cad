use super::MemoryStore;
use crate::cmd::{
    ActivateTenant, CreateTenant, UpdateTenantAdvancedSettings, UpdateTenantBillingSettings,
    UpdateTenantCreatePostsSettings, UpdateTenantPrivacySettings, UpdateTenantSettings,
};
use crate::context::TenancyContextExt;
use crate::models::{Tenant, TenantId, TenantStatus};
use crate::query::GetTenantBySubdomain;
use async_trait::async_trait;
use courier_bus::{Error, Handler, RequestContext, Result};
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

const SUBDOMAIN_MIN_LEN: usize = 2;
const SUBDOMAIN_MAX_LEN: usize = 40;

fn validate_subdomain(subdomain: &str) -> Result<()> {
    let valid_chars = subdomain
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid = valid_chars
        && (SUBDOMAIN_MIN_LEN..=SUBDOMAIN_MAX_LEN).contains(&subdomain.len())
        && !subdomain.starts_with('-')
        && !subdomain.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(Error::Validation.wrap(format!("invalid subdomain {:?}", subdomain)))
    }
}

impl MemoryStore {
    fn update_tenant(&self, id: TenantId, apply: impl FnOnce(&mut Tenant)) -> Result<Tenant> {
        let mut tenant = self
            .inner
            .tenants
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound.wrap(format!("tenant {}", id)))?;
        apply(tenant.value_mut());
        Ok(tenant.value().clone())
    }

    /// Reserve `cname` for `id`. A cname held by another tenant is a conflict.
    fn claim_cname(&self, id: TenantId, cname: &str) -> Result<()> {
        match self.inner.cnames.entry(cname.to_string()) {
            Entry::Occupied(entry) if *entry.get() != id => {
                Err(Error::Conflict.wrap(format!("cname {} is taken", cname)))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    fn release_cname(&self, id: TenantId, cname: &str) {
        if !cname.is_empty() {
            self.inner.cnames.remove_if(cname, |_, owner| *owner == id);
        }
    }
}

#[async_trait]
impl Handler<CreateTenant> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: CreateTenant) -> Result<Tenant> {
        ctx.check()?;

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(Error::Validation.wrap("tenant name is required"));
        }
        let subdomain = cmd.subdomain.trim().to_lowercase();
        validate_subdomain(&subdomain)?;

        let tenant = match self.inner.subdomains.entry(subdomain) {
            Entry::Occupied(entry) => {
                return Err(Error::Conflict.wrap(format!("subdomain {} is taken", entry.key())));
            }
            Entry::Vacant(entry) => {
                let tenant = Tenant::new(self.next_tenant_id(), name, entry.key().as_str())
                    .with_status(cmd.status);
                self.inner.tenants.insert(tenant.id, tenant.clone());
                entry.insert(tenant.id);
                tenant
            }
        };

        info!(tenant_id = tenant.id, subdomain = %tenant.subdomain, status = %tenant.status, "Tenant created");
        Ok(tenant)
    }
}

#[async_trait]
impl Handler<ActivateTenant> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: ActivateTenant) -> Result<()> {
        ctx.check()?;

        let mut refused = None;
        self.update_tenant(cmd.tenant_id, |tenant| match tenant.status {
            TenantStatus::Pending | TenantStatus::Active => tenant.status = TenantStatus::Active,
            other => refused = Some(other),
        })?;

        if let Some(status) = refused {
            return Err(Error::Validation.wrap(format!(
                "tenant {} is {} and cannot be activated",
                cmd.tenant_id, status
            )));
        }
        info!(tenant_id = cmd.tenant_id, "Tenant activated");
        Ok(())
    }
}

#[async_trait]
impl Handler<UpdateTenantSettings> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: UpdateTenantSettings) -> Result<()> {
        ctx.check()?;
        let (tenant, _) = ctx.require_admin()?;

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(Error::Validation.wrap("tenant name is required"));
        }

        self.update_tenant(tenant.id, |t| {
            t.name = name.to_string();
            t.invitation = cmd.invitation;
            t.welcome_message = cmd.welcome_message;
            if !cmd.locale.trim().is_empty() {
                t.locale = cmd.locale.trim().to_string();
            }
        })?;
        debug!(tenant_id = tenant.id, "Tenant settings updated");
        Ok(())
    }
}

#[async_trait]
impl Handler<UpdateTenantPrivacySettings> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: UpdateTenantPrivacySettings) -> Result<()> {
        ctx.check()?;
        let (tenant, _) = ctx.require_admin()?;

        self.update_tenant(tenant.id, |t| t.is_private = cmd.is_private)?;
        debug!(tenant_id = tenant.id, is_private = cmd.is_private, "Tenant privacy updated");
        Ok(())
    }
}

#[async_trait]
impl Handler<UpdateTenantCreatePostsSettings> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: UpdateTenantCreatePostsSettings) -> Result<()> {
        ctx.check()?;
        let (tenant, _) = ctx.require_admin()?;

        self.update_tenant(tenant.id, |t| t.create_posts = cmd.create_posts)?;
        debug!(tenant_id = tenant.id, create_posts = %cmd.create_posts, "Tenant post creation updated");
        Ok(())
    }
}

#[async_trait]
impl Handler<UpdateTenantAdvancedSettings> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: UpdateTenantAdvancedSettings) -> Result<()> {
        ctx.check()?;
        let (tenant, _) = ctx.require_admin()?;

        let cname = cmd.cname.trim().to_lowercase();
        if !cname.is_empty() {
            self.claim_cname(tenant.id, &cname)?;
        }

        let mut previous = String::new();
        let updated = self.update_tenant(tenant.id, |t| {
            previous = std::mem::replace(&mut t.cname, cname.clone());
            t.custom_css = cmd.custom_css;
        });
        match updated {
            Ok(_) if previous != cname => self.release_cname(tenant.id, &previous),
            Ok(_) => {}
            Err(err) => {
                self.release_cname(tenant.id, &cname);
                return Err(err);
            }
        }
        debug!(tenant_id = tenant.id, "Tenant advanced settings updated");
        Ok(())
    }
}

#[async_trait]
impl Handler<UpdateTenantBillingSettings> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: UpdateTenantBillingSettings) -> Result<()> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        self.update_tenant(tenant.id, |t| t.billing = Some(cmd.billing))?;
        debug!(tenant_id = tenant.id, "Tenant billing updated");
        Ok(())
    }
}

#[async_trait]
impl Handler<GetTenantBySubdomain> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, query: GetTenantBySubdomain) -> Result<Tenant> {
        ctx.check()?;

        let subdomain = query.subdomain.trim().to_lowercase();
        let id = self.inner.subdomains.get(&subdomain).map(|entry| *entry.value());
        id.and_then(|id| self.inner.tenants.get(&id).map(|t| t.value().clone()))
            .ok_or_else(|| Error::NotFound.wrap(format!("tenant by subdomain {}", subdomain)))
    }
}
