//! Multi-company support for Leaseguard.
//!
//! This module provides the tenant isolation primitives:
//! - `Company`: the tenant entity (a property-management organization)
//! - `CompanyContext`: immutable request-scoped context
//! - `CompanySettings`: per-company policy configuration
//! - `TenantContextResolver`: principal → context resolution and audited switching
//!
//! # Example
//!
//! ```rust
//! use lg_core::tenant::{Company, CompanyStatus};
//!
//! let company = Company::new("al-noor-estates", "Al Noor Estates").unwrap();
//! assert_eq!(company.status, CompanyStatus::Active);
//! ```

mod context;
pub mod resolver;
mod types;

pub use context::{CompanyContext, ContextScope, Membership, Permission, Principal, Role};
pub use resolver::{ContextSwitchLogEntry, SwitchOutcome, TenantContextResolver};
pub use types::{
    CompanySettings, CompanyStatus, DEFAULT_ESCALATION_INTERVAL_DAYS, DEFAULT_GRACE_PERIOD_DAYS,
    DEFAULT_HEALTH_WINDOW_DAYS, DEFAULT_RENEWAL_LOOKAHEAD_DAYS, DEFAULT_SEVERE_THRESHOLD_DAYS,
};

use crate::db::DbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during tenant operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    /// The principal cannot be mapped to any usable company.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The resolved company is not operational.
    #[error("account suspended")]
    Suspended {
        company_id: Uuid,
        status: CompanyStatus,
    },

    /// Company not found.
    #[error("Company not found: {0}")]
    NotFound(Uuid),

    /// The principal lacks the capability for the requested operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Slug validation failed.
    #[error("Invalid company slug: {0}")]
    InvalidSlug(String),

    /// The backing repository failed.
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<DbError> for TenantError {
    fn from(err: DbError) -> Self {
        TenantError::Repository(err.to_string())
    }
}

/// Validates a company slug:
/// - Lowercase alphanumeric characters and hyphens only
/// - 3-63 characters long
/// - Starts with a letter
/// - Does not end with a hyphen
/// - No consecutive hyphens
fn validate_slug(slug: &str) -> Result<(), TenantError> {
    if slug.len() < 3 || slug.len() > 63 {
        return Err(TenantError::InvalidSlug(format!(
            "Slug must be between 3 and 63 characters, got {}",
            slug.len()
        )));
    }

    if !slug.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(TenantError::InvalidSlug(
            "Slug must start with a lowercase letter".to_string(),
        ));
    }

    if slug.ends_with('-') {
        return Err(TenantError::InvalidSlug(
            "Slug cannot end with a hyphen".to_string(),
        ));
    }

    let mut prev_hyphen = false;
    for ch in slug.chars() {
        if ch == '-' {
            if prev_hyphen {
                return Err(TenantError::InvalidSlug(
                    "Slug cannot contain consecutive hyphens".to_string(),
                ));
            }
            prev_hyphen = true;
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            prev_hyphen = false;
        } else {
            return Err(TenantError::InvalidSlug(format!(
                "Slug contains invalid character '{}'",
                ch
            )));
        }
    }

    Ok(())
}

/// A property-management company: the unit of tenant isolation.
///
/// Companies are never deleted, only moved between statuses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// URL-safe identifier.
    pub slug: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: CompanyStatus,
    /// End of the evaluation period for trial companies.
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Policy configuration.
    #[serde(default)]
    pub settings: CompanySettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Creates a new active company.
    ///
    /// # Errors
    ///
    /// Returns `TenantError::InvalidSlug` if the slug doesn't meet the requirements.
    pub fn new(slug: &str, name: &str) -> Result<Self, TenantError> {
        Self::with_id(Uuid::new_v4(), slug, name)
    }

    /// Creates a company with a specific ID (for fixtures and snapshots).
    pub fn with_id(id: Uuid, slug: &str, name: &str) -> Result<Self, TenantError> {
        validate_slug(slug)?;

        let now = Utc::now();
        Ok(Self {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            status: CompanyStatus::Active,
            trial_ends_at: None,
            settings: CompanySettings::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-checks the slug of a company that arrived from outside (snapshot, store).
    pub fn validate(&self) -> Result<(), TenantError> {
        validate_slug(&self.slug)
    }

    /// Returns true if the company may operate at `now`.
    pub fn is_operational_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            CompanyStatus::Active => true,
            CompanyStatus::Suspended => false,
            CompanyStatus::Trial => self.trial_ends_at.map_or(true, |ends| now < ends),
        }
    }

    /// Updates the company status.
    pub fn update_status(&mut self, status: CompanyStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Updates the company settings.
    pub fn update_settings(&mut self, settings: CompanySettings) {
        self.settings = settings;
        self.updated_at = Utc::now();
    }
}
