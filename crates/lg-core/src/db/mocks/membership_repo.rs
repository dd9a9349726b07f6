//! Mock implementation of MembershipRepository for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{DbError, MembershipRepository};
use crate::tenant::Membership;

/// In-memory membership store.
#[derive(Default)]
pub struct MockMembershipRepository {
    memberships: Arc<RwLock<Vec<Membership>>>,
}

impl MockMembershipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memberships(memberships: Vec<Membership>) -> Self {
        Self {
            memberships: Arc::new(RwLock::new(memberships)),
        }
    }
}

#[async_trait]
impl MembershipRepository for MockMembershipRepository {
    async fn add(&self, membership: &Membership) -> Result<(), DbError> {
        let mut memberships = self.memberships.write().await;
        if memberships
            .iter()
            .any(|m| m.user_id == membership.user_id && m.company_id == membership.company_id)
        {
            return Err(DbError::Constraint(format!(
                "User '{}' is already a member of company {}",
                membership.user_id, membership.company_id
            )));
        }
        memberships.push(membership.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Membership>, DbError> {
        let memberships = self.memberships.read().await;
        Ok(memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_for_company(&self, company_id: Uuid) -> Result<Vec<Membership>, DbError> {
        let memberships = self.memberships.read().await;
        Ok(memberships
            .iter()
            .filter(|m| m.company_id == company_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::Role;

    #[tokio::test]
    async fn test_add_and_list() {
        let repo = MockMembershipRepository::new();
        let company = Uuid::new_v4();
        repo.add(&Membership::new("u1", company, Role::Owner))
            .await
            .unwrap();
        repo.add(&Membership::new("u2", company, Role::Viewer))
            .await
            .unwrap();

        assert_eq!(repo.list_for_user("u1").await.unwrap().len(), 1);
        assert_eq!(repo.list_for_company(company).await.unwrap().len(), 2);
        assert!(repo.list_for_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_membership_rejected() {
        let repo = MockMembershipRepository::new();
        let company = Uuid::new_v4();
        repo.add(&Membership::new("u1", company, Role::Owner))
            .await
            .unwrap();
        let again = repo.add(&Membership::new("u1", company, Role::Viewer)).await;
        assert!(matches!(again, Err(DbError::Constraint(_))));
    }
}
