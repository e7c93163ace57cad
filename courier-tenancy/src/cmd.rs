//! Commands: messages that change tenant or user state.

use crate::models::{Role, Tenant, TenantBilling, TenantId, TenantStatus, User, UserId};
use std::time::Duration;

/// Create a tenant with a unique subdomain.
#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub subdomain: String,
    pub status: TenantStatus,
}

/// Move a pending tenant to active.
#[derive(Debug, Clone)]
pub struct ActivateTenant {
    pub tenant_id: TenantId,
}

/// General settings of the tenant in context. Administrators only.
#[derive(Debug, Clone)]
pub struct UpdateTenantSettings {
    pub name: String,
    pub invitation: String,
    pub welcome_message: String,
    pub locale: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTenantPrivacySettings {
    pub is_private: bool,
}

/// Lowest role that may create posts in the tenant in context.
#[derive(Debug, Clone)]
pub struct UpdateTenantCreatePostsSettings {
    pub create_posts: Role,
}

#[derive(Debug, Clone)]
pub struct UpdateTenantAdvancedSettings {
    pub custom_css: String,
    pub cname: String,
}

/// Replace the billing state of the tenant in context.
#[derive(Debug, Clone)]
pub struct UpdateTenantBillingSettings {
    pub billing: TenantBilling,
}

/// Store a new user in the tenant in context.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub user: User,
}

/// Link an external identity to an existing user.
#[derive(Debug, Clone)]
pub struct RegisterUserProvider {
    pub user_id: UserId,
    pub provider_name: String,
    pub provider_uid: String,
}

/// Change another user's role. Administrators only.
#[derive(Debug, Clone)]
pub struct ChangeUserRole {
    pub user_id: UserId,
    pub role: Role,
}

/// Erase the user in context.
#[derive(Debug, Clone, Default)]
pub struct DeleteCurrentUser;

/// Store a key that proves ownership of `email` once used.
#[derive(Debug, Clone)]
pub struct SaveVerificationKey {
    pub key: String,
    pub duration: Duration,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct SetKeyAsVerified {
    pub key: String,
}

/// Find or create a user by external reference, then by email.
///
/// Returns the id of the existing or new user. A non-empty `reference` is
/// linked to the user as the `reference` provider.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub reference: String,
}

command!(CreateTenant => Tenant);
command!(ActivateTenant => ());
command!(UpdateTenantSettings => ());
command!(UpdateTenantPrivacySettings => ());
command!(UpdateTenantCreatePostsSettings => ());
command!(UpdateTenantAdvancedSettings => ());
command!(UpdateTenantBillingSettings => ());
command!(RegisterUser => User);
command!(RegisterUserProvider => ());
command!(ChangeUserRole => User);
command!(DeleteCurrentUser => ());
command!(SaveVerificationKey => ());
command!(SetKeyAsVerified => ());
command!(CreateUser => UserId);
