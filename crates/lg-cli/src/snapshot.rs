//! JSON data snapshot the CLI operates on.
//!
//! A snapshot holds the companies plus the raw documents of every
//! collection the engine reads. Documents stay untyped until they pass
//! through the tenant query middleware, so malformed ones are reported the
//! same way they would be against a live store.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use lg_core::db::mocks::MockRecordStore;
use lg_core::models::{CONTRACTS, MAINTENANCE_EXPENSES, PAYMENTS, TENANT_CONTACTS};
use lg_core::tenant::{Company, CompanySettings, CompanyStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Company entry in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCompany {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub status: CompanyStatus,
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Falls back to the configured defaults when absent.
    #[serde(default)]
    pub settings: Option<CompanySettings>,
}

/// Snapshot file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub companies: Vec<SnapshotCompany>,
    pub payments: Vec<Value>,
    pub contracts: Vec<Value>,
    pub tenant_contacts: Vec<Value>,
    pub maintenance_expenses: Vec<Value>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Collections in the order they are loaded.
    pub fn collections(&self) -> [(&'static str, &[Value]); 4] {
        [
            (PAYMENTS, self.payments.as_slice()),
            (CONTRACTS, self.contracts.as_slice()),
            (TENANT_CONTACTS, self.tenant_contacts.as_slice()),
            (MAINTENANCE_EXPENSES, self.maintenance_expenses.as_slice()),
        ]
    }

    /// Builds validated companies, applying `defaults` where settings are absent.
    pub fn build_companies(&self, defaults: &CompanySettings) -> Result<Vec<Company>> {
        let mut seen = HashSet::new();
        let mut companies = Vec::with_capacity(self.companies.len());

        for entry in &self.companies {
            if !seen.insert(entry.id) {
                bail!("Duplicate company id in snapshot: {}", entry.id);
            }
            let mut company = Company::with_id(entry.id, &entry.slug, &entry.name)
                .with_context(|| format!("Invalid company '{}'", entry.slug))?;
            company.update_status(entry.status);
            company.trial_ends_at = entry.trial_ends_at;
            company.update_settings(entry.settings.clone().unwrap_or_else(|| defaults.clone()));
            companies.push(company);
        }

        Ok(companies)
    }

    /// Copies every document into `store`.
    pub async fn load_into(&self, store: &MockRecordStore) {
        for (collection, documents) in self.collections() {
            for document in documents {
                store.seed(collection, document.clone()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "companies": [
            {"id": "7c1f8a52-3c55-4c1e-9d55-0a4a3f0c0e01", "slug": "najd-homes", "name": "Najd Homes"},
            {"id": "7c1f8a52-3c55-4c1e-9d55-0a4a3f0c0e02", "slug": "gulf-towers", "name": "Gulf Towers",
             "status": "suspended", "settings": {"grace_period_days": 3}}
        ],
        "payments": [
            {"id": "p-1", "company_id": "7c1f8a52-3c55-4c1e-9d55-0a4a3f0c0e01"}
        ]
    }"#;

    #[test]
    fn test_parse_applies_defaults() {
        let snapshot = Snapshot::parse(SAMPLE).unwrap();
        assert_eq!(snapshot.companies.len(), 2);
        assert_eq!(snapshot.payments.len(), 1);
        assert!(snapshot.contracts.is_empty());

        let defaults = CompanySettings {
            grace_period_days: 9,
            ..CompanySettings::default()
        };
        let companies = snapshot.build_companies(&defaults).unwrap();
        assert_eq!(companies[0].settings.grace_period_days, 9);
        assert_eq!(companies[1].settings.grace_period_days, 3);
        assert_eq!(companies[1].settings.escalation_interval_days, 15);
        assert_eq!(companies[1].status, CompanyStatus::Suspended);
    }

    #[test]
    fn test_duplicate_company_is_rejected() {
        let mut snapshot = Snapshot::parse(SAMPLE).unwrap();
        let first = snapshot.companies[0].clone();
        snapshot.companies.push(first);
        assert!(snapshot
            .build_companies(&CompanySettings::default())
            .is_err());
    }

    #[test]
    fn test_invalid_slug_is_rejected() {
        let mut snapshot = Snapshot::parse(SAMPLE).unwrap();
        snapshot.companies[0].slug = "Not A Slug".to_string();
        let err = snapshot
            .build_companies(&CompanySettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("Not A Slug"));
    }

    #[tokio::test]
    async fn test_load_into_store() {
        let snapshot = Snapshot::parse(SAMPLE).unwrap();
        let store = MockRecordStore::new();
        snapshot.load_into(&store).await;
        assert_eq!(store.count(PAYMENTS).await, 1);
    }
}
