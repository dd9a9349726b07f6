//! # lg-observability
//!
//! Audit, logging, and metrics infrastructure for Leaseguard.
//!
//! ## Audit Logging
//!
//! The audit module provides the append-only bilingual event trail that
//! every other component writes through:
//! - Per-company scoping with ordered replay
//! - English and Arabic messages on every entry
//! - A local fallback buffer so sink outages never abort business logic

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{
    AuditEntry, AuditEventType, AuditLevel, AuditLogger, AuditScope, AuditSink, AuditSinkError,
    MemoryAuditSink,
};
pub use logging::{init_logging_with_config, LoggingConfig};
pub use self::metrics::describe_metrics;
