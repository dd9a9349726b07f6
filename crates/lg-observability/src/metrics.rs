//! Metric names and descriptions for Leaseguard.
//!
//! Recording goes through the `metrics` facade; installing an exporter is
//! left to the embedding binary.

use ::metrics::{describe_counter, describe_histogram, Unit};

/// Audit entries that had to be parked in the local fallback buffer.
pub const AUDIT_FALLBACK_ENTRIES: &str = "leaseguard_audit_fallback_entries_total";
/// Reads or writes rejected for targeting another company.
pub const CROSS_TENANT_REJECTIONS: &str = "leaseguard_cross_tenant_rejections_total";
/// Operations refused because the role lacks a permission.
pub const PERMISSION_DENIALS: &str = "leaseguard_permission_denials_total";
/// Context switch attempts, labelled by outcome.
pub const CONTEXT_SWITCHES: &str = "leaseguard_context_switches_total";
/// Records excluded from financial computations.
pub const MALFORMED_RECORDS: &str = "leaseguard_malformed_records_total";
/// Messages placed on an automation queue.
pub const MESSAGES_QUEUED: &str = "leaseguard_messages_queued_total";
/// Messages accepted by the transport.
pub const MESSAGES_SENT: &str = "leaseguard_messages_sent_total";
/// Messages the transport refused or failed.
pub const MESSAGES_FAILED: &str = "leaseguard_messages_failed_total";
/// Wall-clock duration of one company's sweep unit.
pub const SWEEP_COMPANY_DURATION: &str = "leaseguard_sweep_company_duration_seconds";

/// Registers descriptions for every metric the workspace records.
pub fn describe_metrics() {
    describe_counter!(
        AUDIT_FALLBACK_ENTRIES,
        "Audit entries buffered locally because the sink failed"
    );
    describe_counter!(
        CROSS_TENANT_REJECTIONS,
        "Operations rejected for targeting a company other than the resolved one"
    );
    describe_counter!(
        PERMISSION_DENIALS,
        "Operations refused because the context's role lacks the permission"
    );
    describe_counter!(CONTEXT_SWITCHES, "Context switch attempts by outcome");
    describe_counter!(
        MALFORMED_RECORDS,
        "Records skipped by the financial behavior engine"
    );
    describe_counter!(MESSAGES_QUEUED, "Messages produced by automation queues");
    describe_counter!(MESSAGES_SENT, "Messages accepted by the outbound transport");
    describe_counter!(MESSAGES_FAILED, "Messages rejected by the outbound transport");
    describe_histogram!(
        SWEEP_COMPANY_DURATION,
        Unit::Seconds,
        "Duration of one company's automation sweep unit"
    );
}
