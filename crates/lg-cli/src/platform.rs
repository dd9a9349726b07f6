//! Wires the core services over a loaded snapshot.

use crate::config::AppConfig;
use crate::snapshot::Snapshot;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use lg_core::automation::{NotificationDispatcher, QueuedDocumentTransport};
use lg_core::db::mocks::{
    MemoryDeliveryLedger, MockCompanyRepository, MockMembershipRepository, MockRecordStore,
    MockSwitchLogRepository,
};
use lg_core::models::MalformedRecordError;
use lg_core::scope::ScopedStore;
use lg_core::tenant::{Company, CompanyContext, Principal, TenantContextResolver};
use lg_core::AutomationSweep;
use lg_observability::{AuditEventType, AuditLogger, AuditScope, MemoryAuditSink};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a command needs, backed by in-memory stores.
pub struct Platform {
    pub companies: Vec<Company>,
    pub operator: Principal,
    pub resolver: Arc<TenantContextResolver>,
    pub store: ScopedStore,
    pub raw: Arc<MockRecordStore>,
    pub audit: Arc<AuditLogger>,
    pub sink: Arc<MemoryAuditSink>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl Platform {
    pub async fn build(snapshot: &Snapshot, config: &AppConfig) -> Result<Self> {
        let companies = snapshot.build_companies(&config.defaults)?;

        let raw = Arc::new(MockRecordStore::new());
        snapshot.load_into(&raw).await;

        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(
            AuditLogger::new(sink.clone()).with_fallback_capacity(config.audit.fallback_capacity),
        );
        let resolver = Arc::new(TenantContextResolver::new(
            Arc::new(MockCompanyRepository::with_companies(companies.clone())),
            Arc::new(MockMembershipRepository::new()),
            Arc::new(MockSwitchLogRepository::new()),
            audit.clone(),
        ));
        let store = ScopedStore::new(raw.clone(), audit.clone());
        let dispatcher = Arc::new(
            NotificationDispatcher::new(
                Arc::new(QueuedDocumentTransport::new(store.clone())),
                Arc::new(MemoryDeliveryLedger::with_retention(Duration::hours(
                    config.sweep.ledger_retention_hours.max(1),
                ))),
                audit.clone(),
            )
            .with_retention_hours(config.sweep.ledger_retention_hours),
        );

        let mut operator = Principal::super_admin(config.operator.user_id.clone());
        operator.display_name = config.operator.display_name.clone();

        Ok(Self {
            companies,
            operator,
            resolver,
            store,
            raw,
            audit,
            sink,
            dispatcher,
        })
    }

    pub fn sweep(&self, config: &AppConfig, dry_run: bool) -> AutomationSweep {
        AutomationSweep::new(
            self.resolver.clone(),
            self.store.clone(),
            self.dispatcher.clone(),
            self.audit.clone(),
            config.sweep.to_sweep_config(dry_run),
        )
    }

    /// Finds a company by slug or id.
    pub fn find_company(&self, key: &str) -> Result<&Company> {
        let by_id = Uuid::parse_str(key).ok();
        self.companies
            .iter()
            .find(|c| c.slug == key || Some(c.id) == by_id)
            .ok_or_else(|| anyhow!("Unknown company: {}", key))
    }

    /// Resolves `keys`, or every company operational at `at` when none are given.
    pub async fn select_companies(&self, keys: &[String], at: DateTime<Utc>) -> Result<Vec<Uuid>> {
        if keys.is_empty() {
            let operational = self.resolver.operational_companies(at).await?;
            return Ok(operational.into_iter().map(|c| c.id).collect());
        }
        keys.iter()
            .map(|key| self.find_company(key).map(|c| c.id))
            .collect()
    }

    /// Switches the operator into one company as of `at`.
    pub async fn company_context(
        &self,
        company_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<CompanyContext> {
        let base = self.resolver.resolve_context(&self.operator, at).await?;
        let ctx = self
            .resolver
            .switch_context(&self.operator, &base, company_id, reason, at)
            .await
            .with_context(|| format!("Cannot enter company {}", company_id))?;
        Ok(ctx)
    }

    /// Forwards records the engine skipped to the audit trail.
    pub async fn audit_skipped(&self, company_id: Uuid, skipped: &[MalformedRecordError]) {
        for record in skipped {
            self.audit
                .log_warning(
                    AuditScope::Company(company_id),
                    AuditEventType::MalformedRecordSkipped,
                    format!("Skipped {} '{}': {}", record.kind, record.id, record.reason),
                    format!("تم تجاوز السجل {} '{}': {}", record.kind, record.id, record.reason),
                    json!(record),
                )
                .await;
        }
    }

    /// Writes the audit trail, including any parked fallback entries.
    pub async fn export_audit(&self, path: &Path) -> Result<usize> {
        self.audit.flush_fallback().await;
        let entries = self.sink.entries().await;
        let contents = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write audit trail: {}", path.display()))?;
        Ok(entries.len())
    }
}
