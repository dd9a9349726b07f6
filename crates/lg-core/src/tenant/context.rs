//! Principals, roles, and the immutable company context.

use super::CompanySettings;
use chrono::{DateTime, Utc};
use lg_observability::AuditScope;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Fine-grained permissions checked by callers of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read payments, contracts, and derived reports.
    ReadFinancials,
    /// Record payments and adjust amounts.
    WriteFinancials,
    /// Create, renew, and end contracts.
    ManageContracts,
    /// Dispatch outbound notifications.
    SendNotifications,
    /// Change company settings and memberships.
    ManageCompany,
    /// Switch into another company's scope.
    SwitchContext,
}

impl Permission {
    /// Returns all available permissions.
    pub fn all() -> HashSet<Permission> {
        HashSet::from([
            Permission::ReadFinancials,
            Permission::WriteFinancials,
            Permission::ManageContracts,
            Permission::SendNotifications,
            Permission::ManageCompany,
            Permission::SwitchContext,
        ])
    }

    /// Returns the permission name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadFinancials => "read_financials",
            Permission::WriteFinancials => "write_financials",
            Permission::ManageContracts => "manage_contracts",
            Permission::SendNotifications => "send_notifications",
            Permission::ManageCompany => "manage_company",
            Permission::SwitchContext => "switch_context",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role a user holds inside a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Accountant,
    Viewer,
    /// Platform operator. Never granted through a membership.
    SuperAdmin,
}

impl Role {
    /// Returns the fixed permission set of the role.
    pub fn permissions(&self) -> HashSet<Permission> {
        match self {
            Role::SuperAdmin => Permission::all(),
            Role::Owner => HashSet::from([
                Permission::ReadFinancials,
                Permission::WriteFinancials,
                Permission::ManageContracts,
                Permission::SendNotifications,
                Permission::ManageCompany,
            ]),
            Role::Manager => HashSet::from([
                Permission::ReadFinancials,
                Permission::WriteFinancials,
                Permission::ManageContracts,
                Permission::SendNotifications,
            ]),
            Role::Accountant => {
                HashSet::from([Permission::ReadFinancials, Permission::WriteFinancials])
            }
            Role::Viewer => HashSet::from([Permission::ReadFinancials]),
        }
    }

    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Accountant => "accountant",
            Role::Viewer => "viewer",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated identity handed over by the external auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    /// Provider-issued user id.
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Raw custom claims.
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
    /// Platform operator capability.
    #[serde(default)]
    pub super_admin: bool,
    /// Company the user last worked in, if the provider carries it.
    #[serde(default)]
    pub preferred_company_id: Option<Uuid>,
}

impl Principal {
    /// Creates a regular principal.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            display_name: None,
            claims: serde_json::Map::new(),
            super_admin: false,
            preferred_company_id: None,
        }
    }

    /// Creates a platform-operator principal.
    pub fn super_admin(user_id: impl Into<String>) -> Self {
        Self {
            super_admin: true,
            ..Self::new(user_id)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_preferred_company(mut self, company_id: Uuid) -> Self {
        self.preferred_company_id = Some(company_id);
        self
    }

    /// Name used in audit metadata.
    pub fn audit_identity(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{}:{}", self.user_id, name),
            None => self.user_id.clone(),
        }
    }
}

/// Link between a user and a company.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    pub user_id: String,
    pub company_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: impl Into<String>, company_id: Uuid, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            company_id,
            role,
            joined_at: Utc::now(),
        }
    }
}

/// Which companies a context may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "company_id", rename_all = "snake_case")]
pub enum ContextScope {
    /// Exactly one company.
    Company(Uuid),
    /// Every company. Only produced for super-admin principals.
    AllCompanies,
}

/// Immutable request-scoped tenant context.
///
/// Produced only by [`super::TenantContextResolver`]. Fields are private
/// and there are no setters: switching company yields a new context.
/// Cloning is cheap because permissions and settings are shared.
#[derive(Debug, Clone)]
pub struct CompanyContext {
    scope: ContextScope,
    actor_id: String,
    role: Role,
    permissions: Arc<HashSet<Permission>>,
    super_admin: bool,
    settings: Arc<CompanySettings>,
    resolved_at: DateTime<Utc>,
}

impl CompanyContext {
    pub(crate) fn for_company(
        company_id: Uuid,
        actor_id: impl Into<String>,
        role: Role,
        super_admin: bool,
        settings: CompanySettings,
    ) -> Self {
        Self {
            scope: ContextScope::Company(company_id),
            actor_id: actor_id.into(),
            role,
            permissions: Arc::new(role.permissions()),
            super_admin,
            settings: Arc::new(settings),
            resolved_at: Utc::now(),
        }
    }

    pub(crate) fn all_companies(actor_id: impl Into<String>) -> Self {
        Self {
            scope: ContextScope::AllCompanies,
            actor_id: actor_id.into(),
            role: Role::SuperAdmin,
            permissions: Arc::new(Role::SuperAdmin.permissions()),
            super_admin: true,
            settings: Arc::new(CompanySettings::default()),
            resolved_at: Utc::now(),
        }
    }

    /// Stamps the context with the instant it was resolved for.
    pub(crate) fn resolved_at_time(mut self, at: DateTime<Utc>) -> Self {
        self.resolved_at = at;
        self
    }

    pub fn scope(&self) -> ContextScope {
        self.scope
    }

    /// The company this context is bound to, if any.
    pub fn company_id(&self) -> Option<Uuid> {
        match self.scope {
            ContextScope::Company(id) => Some(id),
            ContextScope::AllCompanies => None,
        }
    }

    /// True when the context bypasses tenant filtering.
    ///
    /// A super-admin that switched into one company is no longer privileged
    /// in this sense; its queries are filtered to that company.
    pub fn is_privileged(&self) -> bool {
        self.scope == ContextScope::AllCompanies
    }

    /// True when the acting principal holds the super-admin capability.
    pub fn is_super_admin(&self) -> bool {
        self.super_admin
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn settings(&self) -> &CompanySettings {
        &self.settings
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// Audit scope for entries written under this context.
    pub fn audit_scope(&self) -> AuditScope {
        match self.scope {
            ContextScope::Company(id) => AuditScope::Company(id),
            ContextScope::AllCompanies => AuditScope::System,
        }
    }
}
