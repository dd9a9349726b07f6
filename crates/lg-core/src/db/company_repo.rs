//! Company repository.
//!
//! Every company-scoped record references a company managed here.
//! Companies are never deleted or edited in place; the only write is a
//! status transition.

use super::DbError;
use crate::tenant::{Company, CompanyStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for company persistence.
#[async_trait]
pub trait CompanyRepository: Send + Sync {
    /// Gets a company by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Company>, DbError>;

    /// Lists every company, ordered by slug.
    async fn list(&self) -> Result<Vec<Company>, DbError>;

    /// Moves a company to `status`, stamping `updated_at` with `at`.
    async fn set_status(
        &self,
        id: Uuid,
        status: CompanyStatus,
        at: DateTime<Utc>,
    ) -> Result<Company, DbError>;
}
