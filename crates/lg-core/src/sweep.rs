//! Scheduled automation sweep.
//!
//! A sweep walks a list of companies and, for each one, switches into the
//! company, loads its records through the tenant query middleware, scores
//! its financial health, builds the automation queue and dispatches it.
//! Each company runs in its own task under a per-company timeout; a
//! failing, slow or panicking company never affects its siblings.

use crate::automation::{process_automation_queue, AutomatedMessage, NotificationDispatcher};
use crate::db::DbError;
use crate::finance::{assess_financial_health, FinancePolicy, PolicyError};
use crate::models::{
    Contract, MalformedRecordError, Payment, TenantContact, CONTRACTS, PAYMENTS, TENANT_CONTACTS,
};
use crate::scope::{Query, ScopeError, ScopedStore};
use crate::tenant::{CompanyContext, Principal, TenantContextResolver, TenantError};
use chrono::{DateTime, Utc};
use lg_observability::metrics::{MALFORMED_RECORDS, SWEEP_COMPANY_DURATION};
use lg_observability::{company_span, AuditEventType, AuditLogger, AuditScope};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

/// Reason recorded on every context switch made by the sweep.
const SWEEP_SWITCH_REASON: &str = "scheduled automation sweep";

/// Errors that abort one company's sweep unit, or the whole sweep when the
/// operator's own context cannot be resolved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    #[error("Context error: {0}")]
    Context(#[from] TenantError),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Invalid company policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Delivery ledger error: {0}")]
    Ledger(#[from] DbError),

    #[error("Invalid sweep configuration: {0}")]
    InvalidConfig(String),
}

/// Sweep tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Budget for everything up to and including queue construction.
    pub per_company_timeout: Duration,
    /// Companies processed at the same time.
    pub max_concurrent_companies: usize,
    /// Build queues without dispatching them.
    pub dry_run: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            per_company_timeout: Duration::from_secs(30),
            max_concurrent_companies: 4,
            dry_run: false,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.max_concurrent_companies == 0 {
            return Err(SweepError::InvalidConfig(
                "max_concurrent_companies must be at least 1".to_string(),
            ));
        }
        if self.per_company_timeout.is_zero() {
            return Err(SweepError::InvalidConfig(
                "per_company_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happened to one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompanyOutcome {
    Completed {
        queued: usize,
        sent: usize,
        failed: usize,
        suppressed: usize,
        skipped: usize,
    },
    /// Queue built but not dispatched.
    DryRun {
        queued: usize,
        suppressed: usize,
        skipped: usize,
        messages: Vec<AutomatedMessage>,
    },
    TimedOut,
    Failed {
        reason: String,
    },
}

impl CompanyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyOutcome::Completed { .. } => "completed",
            CompanyOutcome::DryRun { .. } => "dry_run",
            CompanyOutcome::TimedOut => "timed_out",
            CompanyOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CompanyOutcome::Completed { .. } | CompanyOutcome::DryRun { .. }
        )
    }
}

/// One company's entry in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySweep {
    pub company_id: Uuid,
    pub outcome: CompanyOutcome,
    pub duration_ms: u64,
}

/// Result of [`AutomationSweep::run`], in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub companies: Vec<CompanySweep>,
}

impl SweepReport {
    pub fn outcome_for(&self, company_id: Uuid) -> Option<&CompanyOutcome> {
        self.companies
            .iter()
            .find(|c| c.company_id == company_id)
            .map(|c| &c.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.companies.iter().filter(|c| c.outcome.is_success()).count()
    }

    pub fn unsuccessful(&self) -> usize {
        self.companies.len() - self.succeeded()
    }

    /// Messages accepted by the transport across all companies.
    pub fn total_sent(&self) -> usize {
        self.companies
            .iter()
            .map(|c| match c.outcome {
                CompanyOutcome::Completed { sent, .. } => sent,
                _ => 0,
            })
            .sum()
    }
}

/// A company's queue, fully built and filtered, waiting for dispatch.
struct PreparedQueue {
    ctx: CompanyContext,
    queued: usize,
    suppressed: usize,
    skipped: usize,
    messages: Vec<AutomatedMessage>,
}

struct SweepShared {
    resolver: Arc<TenantContextResolver>,
    store: ScopedStore,
    dispatcher: Arc<NotificationDispatcher>,
    audit: Arc<AuditLogger>,
    config: SweepConfig,
}

/// Runs the automation pipeline across companies.
#[derive(Clone)]
pub struct AutomationSweep {
    shared: Arc<SweepShared>,
}

impl AutomationSweep {
    pub fn new(
        resolver: Arc<TenantContextResolver>,
        store: ScopedStore,
        dispatcher: Arc<NotificationDispatcher>,
        audit: Arc<AuditLogger>,
        config: SweepConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SweepShared {
                resolver,
                store,
                dispatcher,
                audit,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.shared.config
    }

    /// Sweeps `company_ids` on behalf of `principal`.
    ///
    /// A super admin may sweep any company; any other principal may only
    /// sweep the company it resolves to, other targets fail with a denied
    /// switch.
    ///
    /// # Errors
    ///
    /// Fails only when the configuration is invalid or the principal's own
    /// context cannot be resolved. Per-company problems are reported in the
    /// [`SweepReport`].
    #[instrument(skip_all, fields(principal = %principal.user_id, companies = company_ids.len()))]
    pub async fn run(
        &self,
        principal: &Principal,
        company_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<SweepReport, SweepError> {
        let shared = &self.shared;
        shared.config.validate()?;

        let base = shared.resolver.resolve_context(principal, now).await?;
        let started_at = Utc::now();

        let mut targets: Vec<Uuid> = Vec::with_capacity(company_ids.len());
        for id in company_ids {
            if !targets.contains(id) {
                targets.push(*id);
            }
        }

        shared
            .audit
            .log_info(
                AuditScope::System,
                AuditEventType::SweepStarted,
                format!("Automation sweep started for {} companies", targets.len()),
                format!("بدأت جولة الأتمتة لعدد {} من الشركات", targets.len()),
                json!({
                    "actor": principal.audit_identity(),
                    "companies": targets,
                    "dry_run": shared.config.dry_run,
                    "as_of": now,
                }),
            )
            .await;

        let semaphore = Arc::new(Semaphore::new(shared.config.max_concurrent_companies));
        let principal = Arc::new(principal.clone());
        let base = Arc::new(base);
        let mut tasks = JoinSet::new();

        for &company_id in &targets {
            let shared = Arc::clone(shared);
            let semaphore = Arc::clone(&semaphore);
            let principal = Arc::clone(&principal);
            let base = Arc::clone(&base);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (
                        company_id,
                        CompanySweep {
                            company_id,
                            outcome: CompanyOutcome::Failed {
                                reason: "sweep cancelled".to_string(),
                            },
                            duration_ms: 0,
                        },
                    );
                };

                let started = Instant::now();
                let unit = tokio::spawn(
                    Self::run_company(Arc::clone(&shared), principal, base, company_id, now)
                        .instrument(company_span!(company_id)),
                );
                let outcome = match unit.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        let reason = if err.is_panic() {
                            "sweep unit panicked".to_string()
                        } else {
                            "sweep unit cancelled".to_string()
                        };
                        error!(company_id = %company_id, reason = %reason, "Sweep unit aborted");
                        Self::audit_failure(&shared.audit, company_id, &reason).await;
                        CompanyOutcome::Failed { reason }
                    }
                };

                let elapsed = started.elapsed();
                ::metrics::histogram!(SWEEP_COMPANY_DURATION, "outcome" => outcome.as_str())
                    .record(elapsed.as_secs_f64());

                (
                    company_id,
                    CompanySweep {
                        company_id,
                        outcome,
                        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    },
                )
            });
        }

        let mut results: HashMap<Uuid, CompanySweep> = HashMap::with_capacity(targets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((company_id, sweep)) => {
                    results.insert(company_id, sweep);
                }
                Err(err) => error!(error = %err, "Sweep task aborted"),
            }
        }

        let companies: Vec<CompanySweep> = targets
            .iter()
            .map(|id| {
                results.remove(id).unwrap_or_else(|| CompanySweep {
                    company_id: *id,
                    outcome: CompanyOutcome::Failed {
                        reason: "sweep task aborted".to_string(),
                    },
                    duration_ms: 0,
                })
            })
            .collect();

        let report = SweepReport {
            started_at,
            finished_at: Utc::now(),
            dry_run: shared.config.dry_run,
            companies,
        };

        shared
            .audit
            .log_info(
                AuditScope::System,
                AuditEventType::SweepCompleted,
                format!(
                    "Automation sweep finished: {} succeeded, {} unsuccessful",
                    report.succeeded(),
                    report.unsuccessful()
                ),
                format!(
                    "انتهت جولة الأتمتة: نجحت {} ولم تنجح {}",
                    report.succeeded(),
                    report.unsuccessful()
                ),
                json!({
                    "actor": principal.audit_identity(),
                    "succeeded": report.succeeded(),
                    "unsuccessful": report.unsuccessful(),
                    "messages_sent": report.total_sent(),
                    "dry_run": report.dry_run,
                }),
            )
            .await;

        info!(
            succeeded = report.succeeded(),
            unsuccessful = report.unsuccessful(),
            "Automation sweep finished"
        );
        Ok(report)
    }

    async fn run_company(
        shared: Arc<SweepShared>,
        principal: Arc<Principal>,
        base: Arc<CompanyContext>,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> CompanyOutcome {
        let budget = shared.config.per_company_timeout;
        let prepared = match tokio::time::timeout(
            budget,
            Self::prepare(&shared, &principal, &base, company_id, now),
        )
        .await
        {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(err)) => {
                let reason = err.to_string();
                warn!(reason = %reason, "Sweep unit failed");
                Self::audit_failure(&shared.audit, company_id, &reason).await;
                return CompanyOutcome::Failed { reason };
            }
            Err(_) => {
                warn!(timeout_ms = budget.as_millis() as u64, "Sweep unit timed out");
                shared
                    .audit
                    .log_error(
                        AuditScope::Company(company_id),
                        AuditEventType::SweepCompanyTimedOut,
                        format!(
                            "Automation sweep timed out after {} ms; nothing was sent",
                            budget.as_millis()
                        ),
                        format!(
                            "انتهت مهلة جولة الأتمتة بعد {} مللي ثانية ولم يُرسل شيء",
                            budget.as_millis()
                        ),
                        json!({ "timeout_ms": budget.as_millis() as u64 }),
                    )
                    .await;
                return CompanyOutcome::TimedOut;
            }
        };

        if shared.config.dry_run {
            return CompanyOutcome::DryRun {
                queued: prepared.queued,
                suppressed: prepared.suppressed,
                skipped: prepared.skipped,
                messages: prepared.messages,
            };
        }

        let outcomes = shared
            .dispatcher
            .send_messages(&prepared.ctx, &prepared.messages, now)
            .await;
        let sent = outcomes.iter().filter(|o| o.is_success()).count();

        CompanyOutcome::Completed {
            queued: prepared.queued,
            sent,
            failed: outcomes.len() - sent,
            suppressed: prepared.suppressed,
            skipped: prepared.skipped,
        }
    }

    /// Everything before dispatch. Runs under the per-company timeout.
    async fn prepare(
        shared: &SweepShared,
        principal: &Principal,
        base: &CompanyContext,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PreparedQueue, SweepError> {
        let ctx = if base.company_id() == Some(company_id) {
            base.clone()
        } else {
            shared
                .resolver
                .switch_context(principal, base, company_id, SWEEP_SWITCH_REASON, now)
                .await?
        };
        // Suspended or lapsed-trial companies get no automated messages.
        shared
            .resolver
            .ensure_operational(company_id, now)
            .await?;
        let policy = FinancePolicy::from_settings(ctx.settings())?;

        let payments = shared
            .store
            .fetch_as::<Payment>(&ctx, Query::collection(PAYMENTS))
            .await?;
        let contracts = shared
            .store
            .fetch_as::<Contract>(&ctx, Query::collection(CONTRACTS))
            .await?;
        let contacts = shared
            .store
            .fetch_as::<TenantContact>(&ctx, Query::collection(TENANT_CONTACTS))
            .await?;

        let mut skipped: Vec<MalformedRecordError> = Vec::new();
        skipped.extend(payments.malformed);
        skipped.extend(contracts.malformed);
        skipped.extend(contacts.malformed);

        let health =
            assess_financial_health(&payments.records, &contracts.records, &policy, now);
        shared
            .audit
            .log_info(
                AuditScope::Company(company_id),
                AuditEventType::HealthAssessed,
                format!(
                    "Financial health assessed: collection rate {:.2}",
                    health.metrics.collection_rate
                ),
                format!(
                    "تم تقييم الوضع المالي: نسبة التحصيل {:.2}",
                    health.metrics.collection_rate
                ),
                json!({
                    "window_start": health.window_start,
                    "window_end": health.window_end,
                    "metrics": health.metrics,
                    "recommendations": health.recommendations.len(),
                }),
            )
            .await;
        skipped.extend(health.skipped);

        let queue = process_automation_queue(
            &ctx,
            &payments.records,
            &contracts.records,
            &contacts.records,
            &policy,
            now,
        )?;
        skipped.extend(queue.skipped);

        skipped.sort_by(|a, b| (&a.kind, &a.id, &a.reason).cmp(&(&b.kind, &b.id, &b.reason)));
        skipped.dedup();
        Self::audit_skipped(&shared.audit, company_id, &skipped).await;

        let queued = queue.messages.len();
        let (messages, suppressed) = shared
            .dispatcher
            .filter_unsent(&ctx, queue.messages, now)
            .await?;

        Ok(PreparedQueue {
            ctx,
            queued,
            suppressed,
            skipped: skipped.len(),
            messages,
        })
    }

    async fn audit_skipped(audit: &AuditLogger, company_id: Uuid, skipped: &[MalformedRecordError]) {
        for record in skipped {
            ::metrics::counter!(MALFORMED_RECORDS, "kind" => record.kind.clone()).increment(1);
            audit
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

    async fn audit_failure(audit: &AuditLogger, company_id: Uuid, reason: &str) {
        audit
            .log_error(
                AuditScope::Company(company_id),
                AuditEventType::SweepCompanyFailed,
                format!("Automation sweep failed; nothing was sent: {}", reason),
                format!("فشلت جولة الأتمتة ولم يُرسل شيء: {}", reason),
                json!({ "reason": reason }),
            )
            .await;
    }
}
