//! Mock implementation of CompanyRepository for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::company_repo::CompanyRepository;
use crate::db::DbError;
use crate::tenant::{Company, CompanyStatus};

/// Mock implementation of CompanyRepository using in-memory storage.
pub struct MockCompanyRepository {
    companies: Arc<RwLock<HashMap<Uuid, Company>>>,
}

impl Default for MockCompanyRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompanyRepository {
    /// Creates a new mock repository.
    pub fn new() -> Self {
        Self {
            companies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a mock repository pre-populated with companies.
    pub fn with_companies(companies: Vec<Company>) -> Self {
        let map: HashMap<Uuid, Company> = companies.into_iter().map(|c| (c.id, c)).collect();
        Self {
            companies: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl CompanyRepository for MockCompanyRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, DbError> {
        Ok(self.companies.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Company>, DbError> {
        let mut result: Vec<Company> = self.companies.read().await.values().cloned().collect();
        result.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(result)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: CompanyStatus,
        at: DateTime<Utc>,
    ) -> Result<Company, DbError> {
        let mut companies = self.companies.write().await;
        let company = companies.get_mut(&id).ok_or_else(|| DbError::NotFound {
            entity: "Company".to_string(),
            id: id.to_string(),
        })?;

        company.status = status;
        company.updated_at = at;
        Ok(company.clone())
    }
}
