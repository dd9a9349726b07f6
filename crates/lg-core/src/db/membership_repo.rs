//! Membership repository.

use super::DbError;
use crate::tenant::Membership;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for user ↔ company memberships.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Adds a membership. A user holds at most one membership per company.
    async fn add(&self, membership: &Membership) -> Result<(), DbError>;

    /// Lists the memberships of one user.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Membership>, DbError>;

    /// Lists the members of one company.
    async fn list_for_company(&self, company_id: Uuid) -> Result<Vec<Membership>, DbError>;
}
