//! Tenant and user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TenantId = i64;
pub type UserId = i64;

/// Lifecycle state of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    /// Signed up, email not verified yet
    #[default]
    Pending,
    Locked,
    Disabled,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Pending => write!(f, "pending"),
            Self::Locked => write!(f, "locked"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Billing state, maintained by the payment integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBilling {
    pub plan_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub trial_ends_at: DateTime<Utc>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
}

impl TenantBilling {
    pub fn trial(ends_at: DateTime<Utc>) -> Self {
        Self {
            plan_id: None,
            customer_id: None,
            subscription_id: None,
            trial_ends_at: ends_at,
            subscription_ends_at: None,
        }
    }
}

/// One isolated customer space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Lower-cased, unique across tenants
    pub subdomain: String,
    pub status: TenantStatus,
    /// Private tenants are visible to signed-in members only
    pub is_private: bool,
    /// Lowest role allowed to create posts
    pub create_posts: Role,
    pub invitation: String,
    pub welcome_message: String,
    pub locale: String,
    pub custom_css: String,
    pub cname: String,
    pub billing: Option<TenantBilling>,
}

impl Tenant {
    pub fn new(id: TenantId, name: impl Into<String>, subdomain: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            subdomain: subdomain.into().to_lowercase(),
            status: TenantStatus::default(),
            is_private: false,
            create_posts: Role::Visitor,
            invitation: String::new(),
            welcome_message: String::new(),
            locale: "en".to_string(),
            custom_css: String::new(),
            cname: String::new(),
            billing: None,
        }
    }

    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn can_create_posts(&self, user: &User) -> bool {
        user.tenant_id == self.id && user.role >= self.create_posts
    }
}

/// Permission level of a user within its tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Visitor,
    Collaborator,
    Administrator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visitor => write!(f, "visitor"),
            Self::Collaborator => write!(f, "collaborator"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

/// External identity linked to a user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserProvider {
    pub name: String,
    pub uid: String,
}

impl UserProvider {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub providers: Vec<UserProvider>,
}

impl User {
    /// A visitor not yet stored; ids are assigned on registration.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: 0,
            tenant_id: 0,
            name: name.into(),
            email: email.into(),
            role: Role::Visitor,
            providers: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_provider(mut self, name: impl Into<String>, uid: impl Into<String>) -> Self {
        self.providers.push(UserProvider::new(name, uid));
        self
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.name == name)
    }

    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }

    /// Collaborators and administrators
    pub fn is_collaborator(&self) -> bool {
        self.role >= Role::Collaborator
    }
}

/// Pending proof of email ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailVerification {
    pub key: String,
    pub tenant_id: TenantId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl EmailVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_subdomain_is_lowercased() {
        let tenant = Tenant::new(1, "Acme", "AcMe");
        assert_eq!(tenant.subdomain, "acme");
        assert_eq!(tenant.status, TenantStatus::Pending);
        assert!(!tenant.is_active());
    }

    #[test]
    fn test_role_ordering() {
        let admin = User::new("Jon", "jon@acme.com").with_role(Role::Administrator);
        assert!(admin.is_administrator());
        assert!(admin.is_collaborator());

        let visitor = User::new("Arya", "arya@acme.com");
        assert!(!visitor.is_collaborator());
    }

    #[test]
    fn test_has_provider() {
        let user = User::new("Jon", "").with_provider("reference", "ext-1");
        assert!(user.has_provider("reference"));
        assert!(!user.has_provider("google"));
    }

    #[test]
    fn test_verification_expiry() {
        let now = Utc::now();
        let verification = EmailVerification {
            key: "k".into(),
            tenant_id: 1,
            email: "jon@acme.com".into(),
            created_at: now,
            expires_at: now + Duration::minutes(5),
            verified_at: None,
        };
        assert!(!verification.is_expired(now));
        assert!(verification.is_expired(now + Duration::minutes(5)));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Role::Administrator).unwrap(), "\"administrator\"");
        let status: TenantStatus = serde_json::from_str("\"locked\"").unwrap();
        assert_eq!(status, TenantStatus::Locked);
    }
}
