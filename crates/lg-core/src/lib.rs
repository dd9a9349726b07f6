//! # lg-core
//!
//! Tenant isolation, financial behavior engine, and notification automation
//! for Leaseguard.
//!
//! Every operation runs under an explicit [`CompanyContext`] resolved from
//! the authenticated principal. Reads and writes go through the tenant query
//! middleware in [`scope`], which stamps or filters by company id and
//! rejects cross-company access. The finance engine is pure over an
//! explicit `now`; the automation module turns its output into
//! de-duplicated bilingual messages, and [`sweep`] runs the whole pipeline
//! per company with bounded concurrency.

pub mod automation;
pub mod db;
pub mod finance;
pub mod models;
pub mod scope;
pub mod sweep;
pub mod tenant;

pub use automation::{
    process_automation_queue, AutomatedMessage, AutomationQueue, MessageChannel,
    NotificationDispatcher, TriggerTag,
};
pub use finance::{
    assess_financial_health, calculate_cash_flow_forecast, detect_payment_issues,
    CashFlowForecast, FinancePolicy, FinancialHealth, PaymentIssueClassification,
};
pub use models::{
    Contract, LocalizedText, MaintenanceExpense, MalformedRecordError, Payment, TenantContact,
};
pub use scope::{Query, ScopeError, ScopedStore, TenantScope};
pub use sweep::{AutomationSweep, CompanyOutcome, SweepConfig, SweepError, SweepReport};
pub use tenant::{
    Company, CompanyContext, CompanySettings, CompanyStatus, Principal, Role,
    TenantContextResolver, TenantError,
};
