//! Composite operations built from other messages.

use crate::cmd::{CreateUser, RegisterUser, RegisterUserProvider};
use crate::models::{User, UserId};
use crate::query::{GetUserByEmail, GetUserByProvider};
use async_trait::async_trait;
use courier_bus::{ErrorKind, Handler, Message, RequestContext, Result, ResultExt};
use tracing::debug;

/// Provider name under which external references are linked.
pub const REFERENCE_PROVIDER: &str = "reference";

/// Handles [`CreateUser`] by dispatching lookups and registrations on the
/// same request context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateUserHandler;

/// `Ok(None)` when the query misses; other errors pass through.
async fn find<M>(ctx: &RequestContext, query: M) -> Result<Option<User>>
where
    M: Message<Result = User>,
{
    match ctx.dispatch(query).await {
        Ok(user) => Ok(Some(user)),
        Err(err) if err.is(ErrorKind::NotFound) => Ok(None),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl Handler<CreateUser> for CreateUserHandler {
    async fn handle(&self, ctx: &RequestContext, cmd: CreateUser) -> Result<UserId> {
        let mut existing = None;
        if !cmd.reference.is_empty() {
            existing = find(
                ctx,
                GetUserByProvider {
                    provider: REFERENCE_PROVIDER.to_string(),
                    uid: cmd.reference.clone(),
                },
            )
            .await?;
        }
        if existing.is_none() && !cmd.email.is_empty() {
            existing = find(ctx, GetUserByEmail { email: cmd.email.clone() }).await?;
        }

        let user = match existing {
            Some(user) => user,
            None => ctx
                .dispatch(RegisterUser {
                    user: User::new(cmd.name, cmd.email),
                })
                .await
                .wrap_err("registering new user")?,
        };

        if !cmd.reference.is_empty() && !user.has_provider(REFERENCE_PROVIDER) {
            ctx.dispatch(RegisterUserProvider {
                user_id: user.id,
                provider_name: REFERENCE_PROVIDER.to_string(),
                provider_uid: cmd.reference,
            })
            .await
            .wrap_err_with(|| format!("linking reference to user {}", user.id))?;
        }

        debug!(user_id = user.id, "User resolved");
        Ok(user.id)
    }
}
