//! Audit logging for Leaseguard.
//!
//! Every state-changing or security-relevant action in the workspace is
//! recorded here as a bilingual (English/Arabic) structured entry. Entries
//! carry a process-wide monotonic sequence number so that the trail of one
//! company can be replayed in order.
//!
//! The logger never returns errors to its callers. When the configured
//! [`AuditSink`] rejects an entry, the entry is parked in a bounded local
//! fallback buffer and can be re-delivered later with
//! [`AuditLogger::flush_fallback`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Default capacity of the local fallback buffer.
const DEFAULT_FALLBACK_CAPACITY: usize = 10_000;

/// The scope an audit entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "company_id", rename_all = "snake_case")]
pub enum AuditScope {
    /// Entry belongs to a single company's trail.
    Company(Uuid),
    /// Entry concerns the platform itself (operators, sweeps, startup).
    System,
}

impl AuditScope {
    /// Returns the company id if the scope is company-bound.
    pub fn company_id(&self) -> Option<Uuid> {
        match self {
            AuditScope::Company(id) => Some(*id),
            AuditScope::System => None,
        }
    }
}

impl fmt::Display for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditScope::Company(id) => write!(f, "company:{}", id),
            AuditScope::System => write!(f, "system"),
        }
    }
}

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A principal was resolved to a company context.
    ContextResolved,
    /// A principal could not be resolved to a usable context.
    ContextResolutionFailed,
    /// A privileged operator switched company scope.
    ContextSwitched,
    /// A context switch was refused.
    ContextSwitchDenied,
    /// A read or write targeted a company other than the resolved one.
    CrossTenantAccessRejected,
    /// The context's role lacks the permission an operation requires.
    PermissionDenied,
    /// A company moved to a different lifecycle status.
    CompanyStatusChanged,
    /// A record failed shape validation and was excluded.
    MalformedRecordSkipped,
    /// Financial health was assessed for a company.
    HealthAssessed,
    /// An outbound message was handed to the transport.
    NotificationSent,
    /// The transport refused or failed an outbound message.
    NotificationFailed,
    /// An automation sweep started.
    SweepStarted,
    /// An automation sweep finished.
    SweepCompleted,
    /// One company's unit of work in a sweep failed.
    SweepCompanyFailed,
    /// One company's unit of work exceeded its time budget.
    SweepCompanyTimedOut,
    /// Custom event.
    Custom(String),
}

impl AuditEventType {
    /// Returns a stable string form for logs and metrics labels.
    pub fn as_str(&self) -> &str {
        match self {
            AuditEventType::ContextResolved => "context_resolved",
            AuditEventType::ContextResolutionFailed => "context_resolution_failed",
            AuditEventType::ContextSwitched => "context_switched",
            AuditEventType::ContextSwitchDenied => "context_switch_denied",
            AuditEventType::CrossTenantAccessRejected => "cross_tenant_access_rejected",
            AuditEventType::PermissionDenied => "permission_denied",
            AuditEventType::CompanyStatusChanged => "company_status_changed",
            AuditEventType::MalformedRecordSkipped => "malformed_record_skipped",
            AuditEventType::HealthAssessed => "health_assessed",
            AuditEventType::NotificationSent => "notification_sent",
            AuditEventType::NotificationFailed => "notification_failed",
            AuditEventType::SweepStarted => "sweep_started",
            AuditEventType::SweepCompleted => "sweep_completed",
            AuditEventType::SweepCompanyFailed => "sweep_company_failed",
            AuditEventType::SweepCompanyTimedOut => "sweep_company_timed_out",
            AuditEventType::Custom(name) => name.as_str(),
        }
    }
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Monotonic sequence number, unique within the process.
    pub sequence: u64,
    /// Scope the entry is attributed to.
    pub scope: AuditScope,
    /// Severity.
    pub level: AuditLevel,
    /// Event type.
    pub event_type: AuditEventType,
    /// English message.
    pub message_en: String,
    /// Arabic message.
    pub message_ar: String,
    /// Additional structured details.
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Error returned by an [`AuditSink`] that could not persist an entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditSinkError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit sink rejected entry: {0}")]
    Rejected(String),
}

/// Destination for audit entries (a collection in the document store,
/// a log shipper, or memory in tests).
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one entry. Must not mutate or remove prior entries.
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditSinkError>;
}

/// In-memory append-only sink.
///
/// Used by tests and by the CLI. [`MemoryAuditSink::set_failing`] makes the
/// sink reject appends, which exercises the logger's fallback path.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent appends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns all entries in sequence order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        let mut entries = self.entries.read().await.clone();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Returns the trail for one scope in sequence order, ready for replay.
    pub async fn entries_for_scope(&self, scope: AuditScope) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.scope == scope)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Returns entries of one event type in sequence order.
    pub async fn entries_by_type(&self, event_type: &AuditEventType) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.event_type == event_type)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Gets the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Checks if the sink is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Exports entries as JSON.
    pub async fn export_json(&self) -> String {
        let entries = self.entries().await;
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditSinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditSinkError::Unavailable(
                "memory sink set to failing".to_string(),
            ));
        }
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}

/// The audit logger shared by every component.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    sequence: AtomicU64,
    fallback: RwLock<VecDeque<AuditEntry>>,
    fallback_capacity: usize,
    log_to_tracing: bool,
}

impl AuditLogger {
    /// Creates a logger writing to the given sink.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            sequence: AtomicU64::new(1),
            fallback: RwLock::new(VecDeque::new()),
            fallback_capacity: DEFAULT_FALLBACK_CAPACITY,
            log_to_tracing: true,
        }
    }

    /// Creates a logger without tracing output.
    pub fn without_tracing(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            log_to_tracing: false,
            ..Self::new(sink)
        }
    }

    /// Sets the fallback buffer capacity.
    pub fn with_fallback_capacity(mut self, capacity: usize) -> Self {
        self.fallback_capacity = capacity.max(1);
        self
    }

    /// Logs an informational entry.
    pub async fn log_info(
        &self,
        scope: AuditScope,
        event_type: AuditEventType,
        message_en: impl Into<String>,
        message_ar: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.append(
            scope,
            AuditLevel::Info,
            event_type,
            message_en.into(),
            message_ar.into(),
            metadata,
        )
        .await;
    }

    /// Logs a warning entry.
    pub async fn log_warning(
        &self,
        scope: AuditScope,
        event_type: AuditEventType,
        message_en: impl Into<String>,
        message_ar: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.append(
            scope,
            AuditLevel::Warning,
            event_type,
            message_en.into(),
            message_ar.into(),
            metadata,
        )
        .await;
    }

    /// Logs an error entry.
    pub async fn log_error(
        &self,
        scope: AuditScope,
        event_type: AuditEventType,
        message_en: impl Into<String>,
        message_ar: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.append(
            scope,
            AuditLevel::Error,
            event_type,
            message_en.into(),
            message_ar.into(),
            metadata,
        )
        .await;
    }

    /// Builds an entry and writes it to the sink, falling back to the local
    /// buffer on failure.
    pub async fn append(
        &self,
        scope: AuditScope,
        level: AuditLevel,
        event_type: AuditEventType,
        message_en: String,
        message_ar: String,
        metadata: serde_json::Value,
    ) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            scope,
            level,
            event_type,
            message_en,
            message_ar,
            metadata,
            timestamp: Utc::now(),
        };

        if self.log_to_tracing {
            match entry.level {
                AuditLevel::Info => info!(
                    scope = %entry.scope,
                    event_type = entry.event_type.as_str(),
                    sequence = entry.sequence,
                    "Audit: {}",
                    entry.message_en
                ),
                AuditLevel::Warning => warn!(
                    scope = %entry.scope,
                    event_type = entry.event_type.as_str(),
                    sequence = entry.sequence,
                    "Audit: {}",
                    entry.message_en
                ),
                AuditLevel::Error => error!(
                    scope = %entry.scope,
                    event_type = entry.event_type.as_str(),
                    sequence = entry.sequence,
                    "Audit: {}",
                    entry.message_en
                ),
            }
        }

        if let Err(e) = self.sink.append(&entry).await {
            warn!(error = %e, sequence = entry.sequence, "Audit sink failed, buffering entry locally");
            ::metrics::counter!(crate::metrics::AUDIT_FALLBACK_ENTRIES).increment(1);
            self.buffer(entry).await;
        }
    }

    async fn buffer(&self, entry: AuditEntry) {
        let mut fallback = self.fallback.write().await;
        if fallback.len() >= self.fallback_capacity {
            if let Some(dropped) = fallback.pop_front() {
                error!(
                    sequence = dropped.sequence,
                    "Audit fallback buffer full, dropping oldest entry"
                );
            }
        }
        fallback.push_back(entry);
    }

    /// Re-delivers buffered entries in sequence order.
    ///
    /// Stops at the first failure so ordering is preserved; returns the
    /// number of entries delivered.
    pub async fn flush_fallback(&self) -> usize {
        let mut fallback = self.fallback.write().await;
        let mut delivered = 0;
        while let Some(entry) = fallback.front() {
            if let Err(e) = self.sink.append(entry).await {
                warn!(error = %e, remaining = fallback.len(), "Audit sink still failing");
                break;
            }
            fallback.pop_front();
            delivered += 1;
        }
        delivered
    }

    /// Returns a copy of the entries waiting in the fallback buffer.
    pub async fn pending_fallback(&self) -> Vec<AuditEntry> {
        self.fallback.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger_with_sink() -> (AuditLogger, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        (AuditLogger::without_tracing(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_log_info() {
        let (logger, sink) = logger_with_sink();

        logger
            .log_info(
                AuditScope::System,
                AuditEventType::SweepStarted,
                "Sweep started",
                "بدأت عملية المسح",
                serde_json::json!({}),
            )
            .await;

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, AuditLevel::Info);
        assert_eq!(entries[0].event_type, AuditEventType::SweepStarted);
        assert_eq!(entries[0].message_ar, "بدأت عملية المسح");
    }

    #[tokio::test]
    async fn test_sequence_is_monotonic_within_scope() {
        let (logger, sink) = logger_with_sink();
        let company = AuditScope::Company(Uuid::new_v4());

        for i in 0..5 {
            logger
                .log_info(
                    company,
                    AuditEventType::Custom(format!("event-{}", i)),
                    format!("Event {}", i),
                    format!("حدث {}", i),
                    serde_json::json!({ "i": i }),
                )
                .await;
            logger
                .log_info(
                    AuditScope::System,
                    AuditEventType::Custom("noise".to_string()),
                    "noise",
                    "ضوضاء",
                    serde_json::json!({}),
                )
                .await;
        }

        let trail = sink.entries_for_scope(company).await;
        assert_eq!(trail.len(), 5);
        assert!(trail.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert!(matches!(
            &trail[0].event_type,
            AuditEventType::Custom(s) if s == "event-0"
        ));
    }

    #[tokio::test]
    async fn test_sink_failure_falls_back_to_buffer() {
        let (logger, sink) = logger_with_sink();
        sink.set_failing(true);

        logger
            .log_error(
                AuditScope::System,
                AuditEventType::NotificationFailed,
                "Transport down",
                "وسيلة الإرسال متوقفة",
                serde_json::json!({}),
            )
            .await;

        assert!(sink.is_empty().await);
        assert_eq!(logger.pending_fallback().await.len(), 1);

        // Still failing: nothing is delivered and nothing is lost.
        assert_eq!(logger.flush_fallback().await, 0);
        assert_eq!(logger.pending_fallback().await.len(), 1);

        sink.set_failing(false);
        assert_eq!(logger.flush_fallback().await, 1);
        assert!(logger.pending_fallback().await.is_empty());
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_fallback_buffer_is_bounded() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::without_tracing(sink.clone()).with_fallback_capacity(3);
        sink.set_failing(true);

        for i in 0..5 {
            logger
                .log_warning(
                    AuditScope::System,
                    AuditEventType::Custom(format!("event-{}", i)),
                    "buffered",
                    "مخزن مؤقتاً",
                    serde_json::json!({}),
                )
                .await;
        }

        let pending = logger.pending_fallback().await;
        assert_eq!(pending.len(), 3);
        assert!(matches!(
            &pending[0].event_type,
            AuditEventType::Custom(s) if s == "event-2"
        ));
    }

    #[tokio::test]
    async fn test_entries_by_type() {
        let (logger, sink) = logger_with_sink();
        let scope = AuditScope::Company(Uuid::new_v4());

        logger
            .log_warning(
                scope,
                AuditEventType::CrossTenantAccessRejected,
                "Rejected",
                "مرفوض",
                serde_json::json!({}),
            )
            .await;
        logger
            .log_info(
                scope,
                AuditEventType::HealthAssessed,
                "Assessed",
                "تم التقييم",
                serde_json::json!({}),
            )
            .await;

        let rejected = sink
            .entries_by_type(&AuditEventType::CrossTenantAccessRejected)
            .await;
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].level, AuditLevel::Warning);
    }

    #[tokio::test]
    async fn test_export_json() {
        let (logger, sink) = logger_with_sink();

        logger
            .log_info(
                AuditScope::System,
                AuditEventType::SweepCompleted,
                "Done",
                "تم",
                serde_json::json!({"companies": 2}),
            )
            .await;

        let json = sink.export_json().await;
        assert!(json.contains("sweep_completed"));
        assert!(json.contains("\"companies\": 2"));
    }

    #[test]
    fn test_scope_display() {
        let id = Uuid::nil();
        assert_eq!(AuditScope::System.to_string(), "system");
        assert_eq!(
            AuditScope::Company(id).to_string(),
            format!("company:{}", id)
        );
        assert_eq!(AuditScope::Company(id).company_id(), Some(id));
        assert_eq!(AuditScope::System.company_id(), None);
    }
}
