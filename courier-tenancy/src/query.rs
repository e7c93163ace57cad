//! Queries: read-only messages.

use crate::models::{EmailVerification, Tenant, User, UserId};

/// Every user of the tenant in context, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct GetAllUsers;

#[derive(Debug, Clone)]
pub struct GetUserByEmail {
    pub email: String,
}

/// Look a user up by an external identity.
#[derive(Debug, Clone)]
pub struct GetUserByProvider {
    pub provider: String,
    pub uid: String,
}

#[derive(Debug, Clone)]
pub struct GetUserById {
    pub user_id: UserId,
}

/// Resolve a tenant from a request host. Not scoped to a tenant.
#[derive(Debug, Clone)]
pub struct GetTenantBySubdomain {
    pub subdomain: String,
}

/// An unexpired verification key of the tenant in context.
#[derive(Debug, Clone)]
pub struct GetVerificationByKey {
    pub key: String,
}

query!(GetAllUsers => Vec<User>);
query!(GetUserByEmail => User);
query!(GetUserByProvider => User);
query!(GetUserById => User);
query!(GetTenantBySubdomain => Tenant);
query!(GetVerificationByKey => EmailVerification);
