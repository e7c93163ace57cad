use super::{MemoryStore, email_key};
use crate::cmd::{ChangeUserRole, DeleteCurrentUser, RegisterUser, RegisterUserProvider};
use crate::context::TenancyContextExt;
use crate::models::{TenantId, User, UserId, UserProvider};
use crate::query::{GetAllUsers, GetUserByEmail, GetUserById, GetUserByProvider};
use async_trait::async_trait;
use courier_bus::{Error, Handler, RequestContext, Result};
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

fn provider_key(tenant_id: TenantId, name: &str, uid: &str) -> (TenantId, String, String) {
    (tenant_id, name.to_string(), uid.to_string())
}

impl MemoryStore {
    fn find_user(&self, tenant_id: TenantId, id: Option<UserId>) -> Option<User> {
        let id = id?;
        self.inner
            .users
            .get(&id)
            .filter(|user| user.tenant_id == tenant_id)
            .map(|user| user.value().clone())
    }

    /// Map a provider identity to `user_id`, unless another user holds it.
    fn claim_provider(&self, tenant_id: TenantId, provider: &UserProvider, user_id: UserId) -> Result<()> {
        match self
            .inner
            .providers
            .entry(provider_key(tenant_id, &provider.name, &provider.uid))
        {
            Entry::Occupied(entry) if *entry.get() != user_id => Err(Error::Conflict.wrap(format!(
                "{} identity {} belongs to another user",
                provider.name, provider.uid
            ))),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(user_id);
                Ok(())
            }
        }
    }

    fn release_user_keys(&self, user: &User) {
        if !user.email.is_empty() {
            self.inner.emails.remove(&email_key(user.tenant_id, &user.email));
        }
        for provider in &user.providers {
            self.inner
                .providers
                .remove_if(&provider_key(user.tenant_id, &provider.name, &provider.uid), |_, id| {
                    *id == user.id
                });
        }
    }
}

#[async_trait]
impl Handler<RegisterUser> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: RegisterUser) -> Result<User> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        let mut user = cmd.user;
        user.name = user.name.trim().to_string();
        user.email = user.email.trim().to_string();
        if user.name.is_empty() {
            return Err(Error::Validation.wrap("user name is required"));
        }
        user.id = self.next_user_id();
        user.tenant_id = tenant.id;

        if !user.email.is_empty() {
            match self.inner.emails.entry(email_key(tenant.id, &user.email)) {
                Entry::Occupied(_) => {
                    return Err(Error::Conflict.wrap(format!(
                        "email {} is already registered",
                        user.email
                    )));
                }
                Entry::Vacant(entry) => {
                    entry.insert(user.id);
                }
            }
        }

        for provider in &user.providers {
            if let Err(err) = self.claim_provider(tenant.id, provider, user.id) {
                self.release_user_keys(&user);
                return Err(err);
            }
        }

        self.inner.users.insert(user.id, user.clone());
        info!(tenant_id = tenant.id, user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }
}

#[async_trait]
impl Handler<RegisterUserProvider> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: RegisterUserProvider) -> Result<()> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        if self.find_user(tenant.id, Some(cmd.user_id)).is_none() {
            return Err(Error::NotFound.wrap(format!("user {}", cmd.user_id)));
        }

        let provider = UserProvider::new(cmd.provider_name, cmd.provider_uid);
        self.claim_provider(tenant.id, &provider, cmd.user_id)?;

        if let Some(mut user) = self.inner.users.get_mut(&cmd.user_id) {
            if !user.providers.contains(&provider) {
                user.providers.push(provider);
            }
        }
        debug!(tenant_id = tenant.id, user_id = cmd.user_id, "User provider registered");
        Ok(())
    }
}

#[async_trait]
impl Handler<ChangeUserRole> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, cmd: ChangeUserRole) -> Result<User> {
        ctx.check()?;
        let (tenant, current) = ctx.require_admin()?;

        if current.id == cmd.user_id {
            return Err(Error::Validation.wrap("cannot change your own role"));
        }

        let mut user = self
            .inner
            .users
            .get_mut(&cmd.user_id)
            .filter(|user| user.tenant_id == tenant.id)
            .ok_or_else(|| Error::NotFound.wrap(format!("user {}", cmd.user_id)))?;
        let previous = user.role;
        user.role = cmd.role;

        info!(
            tenant_id = tenant.id,
            user_id = cmd.user_id,
            from = %previous,
            to = %cmd.role,
            "User role changed"
        );
        Ok(user.value().clone())
    }
}

#[async_trait]
impl Handler<DeleteCurrentUser> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, _cmd: DeleteCurrentUser) -> Result<()> {
        ctx.check()?;
        let current = ctx.require_user()?;
        let tenant = ctx.require_tenant()?;

        let (_, removed) = self
            .inner
            .users
            .remove_if(&current.id, |_, user| user.tenant_id == tenant.id)
            .ok_or_else(|| Error::NotFound.wrap(format!("user {}", current.id)))?;
        self.release_user_keys(&removed);

        info!(tenant_id = tenant.id, user_id = removed.id, "User deleted");
        Ok(())
    }
}

#[async_trait]
impl Handler<GetAllUsers> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, _query: GetAllUsers) -> Result<Vec<User>> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        let mut users: Vec<User> = self
            .inner
            .users
            .iter()
            .filter(|user| user.tenant_id == tenant.id)
            .map(|user| user.value().clone())
            .collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }
}

#[async_trait]
impl Handler<GetUserByEmail> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, query: GetUserByEmail) -> Result<User> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        let id = self
            .inner
            .emails
            .get(&email_key(tenant.id, &query.email))
            .map(|entry| *entry.value());
        self.find_user(tenant.id, id)
            .ok_or_else(|| Error::NotFound.wrap(format!("user by email {}", query.email)))
    }
}

#[async_trait]
impl Handler<GetUserByProvider> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, query: GetUserByProvider) -> Result<User> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        let id = self
            .inner
            .providers
            .get(&provider_key(tenant.id, &query.provider, &query.uid))
            .map(|entry| *entry.value());
        self.find_user(tenant.id, id).ok_or_else(|| {
            Error::NotFound.wrap(format!("user by provider {}/{}", query.provider, query.uid))
        })
    }
}

#[async_trait]
impl Handler<GetUserById> for MemoryStore {
    async fn handle(&self, ctx: &RequestContext, query: GetUserById) -> Result<User> {
        ctx.check()?;
        let tenant = ctx.require_tenant()?;

        self.find_user(tenant.id, Some(query.user_id))
            .ok_or_else(|| Error::NotFound.wrap(format!("user {}", query.user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Tenant};
    use courier_bus::{ErrorKind, cause};

    fn tenant_ctx(id: TenantId) -> RequestContext {
        RequestContext::new().with_tenant(Tenant::new(id, "Acme", format!("acme{id}")))
    }

    async fn register(store: &MemoryStore, ctx: &RequestContext, user: User) -> User {
        store.handle(ctx, RegisterUser { user }).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup_by_email() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);

        let jon = register(&store, &ctx, User::new("Jon Snow", " Jon@Acme.com ")).await;
        assert_eq!(jon.tenant_id, 1);
        assert_eq!(jon.email, "Jon@Acme.com");

        let found = store
            .handle(&ctx, GetUserByEmail { email: "jon@acme.com".into() })
            .await
            .unwrap();
        assert_eq!(found.id, jon.id);
    }

    #[tokio::test]
    async fn test_missing_email_is_wrapped_not_found() {
        let store = MemoryStore::new();
        let err = store
            .handle(&tenant_ctx(1), GetUserByEmail { email: "ghost@acme.com".into() })
            .await
            .unwrap_err();

        assert!(matches!(cause(&err), Error::NotFound));
        assert_eq!(err.to_string(), "user by email ghost@acme.com: not found");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);
        register(&store, &ctx, User::new("Jon", "jon@acme.com")).await;

        let err = store
            .handle(&ctx, RegisterUser { user: User::new("Other Jon", "JON@acme.com") })
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Conflict));

        // Same email in another tenant is fine
        register(&store, &tenant_ctx(2), User::new("Jon", "jon@acme.com")).await;
        assert_eq!(store.user_count(), 2);
    }

    #[tokio::test]
    async fn test_users_are_tenant_scoped() {
        let store = MemoryStore::new();
        let jon = register(&store, &tenant_ctx(1), User::new("Jon", "jon@acme.com")).await;

        let other = tenant_ctx(2);
        let err = store
            .handle(&other, GetUserById { user_id: jon.id })
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
        assert!(store.handle(&other, GetAllUsers).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queries_without_tenant_are_forbidden() {
        let store = MemoryStore::new();
        let err = store
            .handle(&RequestContext::new(), GetAllUsers)
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Forbidden));
    }

    #[tokio::test]
    async fn test_provider_registration() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);
        let jon = register(&store, &ctx, User::new("Jon", "jon@acme.com")).await;
        let arya = register(&store, &ctx, User::new("Arya", "arya@acme.com")).await;

        let link = |user_id| RegisterUserProvider {
            user_id,
            provider_name: "github".into(),
            provider_uid: "42".into(),
        };
        store.handle(&ctx, link(jon.id)).await.unwrap();
        store.handle(&ctx, link(jon.id)).await.unwrap();

        let found = store
            .handle(&ctx, GetUserByProvider { provider: "github".into(), uid: "42".into() })
            .await
            .unwrap();
        assert_eq!(found.id, jon.id);
        assert_eq!(found.providers.len(), 1);

        let err = store.handle(&ctx, link(arya.id)).await.unwrap_err();
        assert!(err.is(ErrorKind::Conflict));
        let err = store.handle(&ctx, link(999)).await.unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_provider_conflict_releases_email() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);
        register(&store, &ctx, User::new("Jon", "jon@acme.com").with_provider("github", "1")).await;

        let err = store
            .handle(
                &ctx,
                RegisterUser {
                    user: User::new("Arya", "arya@acme.com").with_provider("github", "1"),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Conflict));

        register(&store, &ctx, User::new("Arya", "arya@acme.com")).await;
    }

    #[tokio::test]
    async fn test_change_user_role() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);
        let admin = register(
            &store,
            &ctx,
            User::new("Jon", "jon@acme.com").with_role(Role::Administrator),
        )
        .await;
        let arya = register(&store, &ctx, User::new("Arya", "arya@acme.com")).await;

        let as_admin = ctx.with_user(admin.clone());
        let updated = store
            .handle(&as_admin, ChangeUserRole { user_id: arya.id, role: Role::Collaborator })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Collaborator);

        let err = store
            .handle(&as_admin, ChangeUserRole { user_id: admin.id, role: Role::Visitor })
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Validation));

        let err = store
            .handle(&as_admin, ChangeUserRole { user_id: 999, role: Role::Visitor })
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));

        let as_arya = ctx.with_user(updated);
        let err = store
            .handle(&as_arya, ChangeUserRole { user_id: admin.id, role: Role::Visitor })
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Forbidden));
    }

    #[tokio::test]
    async fn test_delete_current_user() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);

        let err = store.handle(&ctx, DeleteCurrentUser).await.unwrap_err();
        assert!(err.is(ErrorKind::Forbidden));

        let jon = register(&store, &ctx, User::new("Jon", "jon@acme.com").with_provider("github", "7")).await;
        let as_jon = ctx.with_user(jon.clone());
        store.handle(&as_jon, DeleteCurrentUser).await.unwrap();
        assert_eq!(store.user_count(), 0);

        let err = store.handle(&as_jon, DeleteCurrentUser).await.unwrap_err();
        assert!(err.is(ErrorKind::NotFound));

        // Email and identity are free again
        register(&store, &ctx, User::new("Jon", "jon@acme.com").with_provider("github", "7")).await;
    }

    #[tokio::test]
    async fn test_all_users_ordered_by_id() {
        let store = MemoryStore::new();
        let ctx = tenant_ctx(1);
        for name in ["a", "b", "c"] {
            register(&store, &ctx, User::new(name, format!("{name}@acme.com"))).await;
        }

        let users = store.handle(&ctx, GetAllUsers).await.unwrap();
        let ids: Vec<UserId> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
