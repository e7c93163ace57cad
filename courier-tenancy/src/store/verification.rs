use super::MemoryStore;
use crate::cmd::{SaveVerificationKey, SetKeyAsVerified};
use crate::context::TenancyContextExt;
use crate::models::EmailVerification;
use crate::query::GetVerificationByKey;
use async_trait::async_trait;
use chrono::Utc;
use courier_bus::{Error, Handler, RequestContext, Result};
use tracing::debug;

#[async_trait]
impl Handler<SaveVerificationKey> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: SaveVerificationKey) -> Result<()> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        if cmd.key.trim().is_empty() {
            return Err(Error::Validation.wrap("verification key is required"));
        }
        let ttl = chrono::Duration::from_std(cmd.duration)
            .map_err(|_| Error::Validation.wrap("verification duration is out of range"))?;

        let now = Utc::now();
        let verification = EmailVerification {
            key: cmd.key.clone(),
            tenant_id: tenant.id,
            email: cmd.email.trim().to_string(),
            created_at: now,
            expires_at: now + ttl,
            verified_at: None,
        };
        self.inner
            .verifications
            .insert((tenant.id, cmd.key), verification);

        debug!(tenant_id = tenant.id, "Verification key saved");
        Ok(())
    }
}

#[async_trait]
impl Handler<SetKeyAsVerified> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: SetKeyAsVerified) -> Result<()> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        let now = Utc::now();
        let mut verification = self
            .inner
            .verifications
            .get_mut(&(tenant.id, cmd.key))
            .filter(|verification| !verification.is_expired(now))
            .ok_or_else(|| Error::NotFound.wrap("verification key"))?;
        verification.verified_at = Some(now);
        Ok(())
    }
}

#[async_trait]
impl Handler<GetVerificationByKey> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, query: GetVerificationByKey) -> Result<EmailVerification> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        self.inner
            .verifications
            .get(&(tenant.id, query.key))
            .map(|entry| entry.value().clone())
            .filter(|verification| !verification.is_expired(Utc::now()))
            .ok_or_else(|| Error::NotFound.wrap("verification key"))
    }
}
