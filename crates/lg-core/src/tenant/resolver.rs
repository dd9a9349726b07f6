//! Principal → company context resolution and audited context switching.
//!
//! Resolution order for regular principals:
//! 1. Membership matching the `preferred_company_id` claim
//! 2. Earliest membership by join date
//!
//! Super-admin principals resolve to an all-companies context and may
//! switch into a single company. Every switch attempt, successful or not,
//! appends one [`ContextSwitchLogEntry`] and one audit entry before the
//! call returns.

use super::{
    Company, CompanyContext, CompanyStatus, Membership, Permission, Principal, Role, TenantError,
};
use crate::db::{CompanyRepository, MembershipRepository, SwitchLogRepository};
use chrono::{DateTime, Utc};
use lg_observability::metrics::CONTEXT_SWITCHES;
use lg_observability::{AuditEventType, AuditLogger, AuditScope};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Result of one context switch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Success,
    Denied(String),
    NotFound,
}

impl SwitchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchOutcome::Success => "success",
            SwitchOutcome::Denied(_) => "denied",
            SwitchOutcome::NotFound => "not_found",
        }
    }
}

/// Append-only record of one context switch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSwitchLogEntry {
    pub id: Uuid,
    /// Provider user id of the acting principal.
    pub principal_id: String,
    pub previous_company_id: Option<Uuid>,
    pub target_company_id: Uuid,
    pub reason: String,
    pub outcome: SwitchOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Resolves principals to [`CompanyContext`]s.
pub struct TenantContextResolver {
    companies: Arc<dyn CompanyRepository>,
    memberships: Arc<dyn MembershipRepository>,
    switch_log: Arc<dyn SwitchLogRepository>,
    audit: Arc<AuditLogger>,
}

impl TenantContextResolver {
    pub fn new(
        companies: Arc<dyn CompanyRepository>,
        memberships: Arc<dyn MembershipRepository>,
        switch_log: Arc<dyn SwitchLogRepository>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            companies,
            memberships,
            switch_log,
            audit,
        }
    }

    /// Maps an authenticated principal to its working context as of `now`.
    ///
    /// # Errors
    ///
    /// - `Authentication` when the principal has no membership or the
    ///   membership points at a company that does not exist.
    /// - `Suspended` when the company is not operational.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn resolve_context(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<CompanyContext, TenantError> {
        if principal.super_admin {
            let ctx = CompanyContext::all_companies(&principal.user_id).resolved_at_time(now);
            self.audit
                .log_info(
                    AuditScope::System,
                    AuditEventType::ContextResolved,
                    format!(
                        "Operator {} resolved to all-companies scope",
                        principal.user_id
                    ),
                    format!("تم تحديد نطاق جميع الشركات للمشرف {}", principal.user_id),
                    json!({ "actor": principal.audit_identity(), "scope": "all_companies" }),
                )
                .await;
            return Ok(ctx);
        }

        match self.resolve_membership(principal, now).await {
            Ok((membership, company)) => {
                let ctx = CompanyContext::for_company(
                    company.id,
                    &principal.user_id,
                    membership.role,
                    false,
                    company.settings.clone(),
                )
                .resolved_at_time(now);
                debug!(company_id = %company.id, role = %membership.role, "Context resolved");
                self.audit
                    .log_info(
                        AuditScope::Company(company.id),
                        AuditEventType::ContextResolved,
                        format!(
                            "User {} entered {} as {}",
                            principal.user_id, company.name, membership.role
                        ),
                        format!(
                            "دخل المستخدم {} إلى {} بدور {}",
                            principal.user_id, company.name, membership.role
                        ),
                        json!({
                            "actor": principal.audit_identity(),
                            "role": membership.role.as_str(),
                        }),
                    )
                    .await;
                Ok(ctx)
            }
            Err(err) => {
                warn!(error = %err, "Context resolution failed");
                let scope = match &err {
                    TenantError::Suspended { company_id, .. } => AuditScope::Company(*company_id),
                    _ => AuditScope::System,
                };
                self.audit
                    .log_warning(
                        scope,
                        AuditEventType::ContextResolutionFailed,
                        format!(
                            "Context resolution failed for {}: {}",
                            principal.user_id, err
                        ),
                        format!("تعذر تحديد سياق المستخدم {}", principal.user_id),
                        json!({ "actor": principal.audit_identity(), "error": err.to_string() }),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn resolve_membership(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<(Membership, Company), TenantError> {
        let mut memberships = self.memberships.list_for_user(&principal.user_id).await?;
        memberships.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then(a.company_id.cmp(&b.company_id))
        });

        let membership = principal
            .preferred_company_id
            .and_then(|preferred| {
                memberships
                    .iter()
                    .find(|m| m.company_id == preferred)
                    .cloned()
            })
            .or_else(|| memberships.first().cloned())
            .ok_or_else(|| {
                TenantError::Authentication(format!(
                    "user {} has no company membership",
                    principal.user_id
                ))
            })?;

        let company = self
            .companies
            .get(membership.company_id)
            .await?
            .ok_or_else(|| {
                TenantError::Authentication(format!(
                    "membership references unknown company {}",
                    membership.company_id
                ))
            })?;

        if !company.is_operational_at(now) {
            return Err(TenantError::Suspended {
                company_id: company.id,
                status: company.status,
            });
        }

        Ok((membership, company))
    }

    /// Switches a super-admin into one company.
    ///
    /// `current` is borrowed immutably and is unaffected by a failed switch.
    /// One switch-log entry and one audit entry are written before this
    /// returns, whatever the outcome.
    #[instrument(skip(self, principal, current, reason), fields(user_id = %principal.user_id))]
    pub async fn switch_context(
        &self,
        principal: &Principal,
        current: &CompanyContext,
        target_company_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CompanyContext, TenantError> {
        let attempt = self.attempt_switch(principal, current, target_company_id).await;

        let outcome = match &attempt {
            Ok(_) => SwitchOutcome::Success,
            Err(TenantError::NotFound(_)) => SwitchOutcome::NotFound,
            Err(err) => SwitchOutcome::Denied(err.to_string()),
        };

        let entry = ContextSwitchLogEntry {
            id: Uuid::new_v4(),
            principal_id: principal.user_id.clone(),
            previous_company_id: current.company_id(),
            target_company_id,
            reason: reason.to_string(),
            outcome: outcome.clone(),
            timestamp: now,
        };

        ::metrics::counter!(CONTEXT_SWITCHES, "outcome" => outcome.as_str()).increment(1);

        let logged = self.switch_log.append(&entry).await;
        match &logged {
            Err(err) if attempt.is_ok() => {
                error!(error = %err, "Failed to persist context switch log entry");
                let refused = ContextSwitchLogEntry {
                    outcome: SwitchOutcome::Denied("switch log unavailable".to_string()),
                    ..entry.clone()
                };
                self.audit_switch(principal, &refused).await;
            }
            Err(err) => {
                error!(error = %err, "Failed to persist context switch log entry");
                self.audit_switch(principal, &entry).await;
            }
            Ok(()) => self.audit_switch(principal, &entry).await,
        }

        match attempt {
            Ok(company) => {
                // An unrecorded switch must not take effect.
                logged?;
                info!(company_id = %company.id, "Context switched");
                Ok(CompanyContext::for_company(
                    company.id,
                    &principal.user_id,
                    Role::SuperAdmin,
                    true,
                    company.settings,
                )
                .resolved_at_time(now))
            }
            Err(err) => Err(err),
        }
    }

    async fn attempt_switch(
        &self,
        principal: &Principal,
        current: &CompanyContext,
        target_company_id: Uuid,
    ) -> Result<Company, TenantError> {
        if !principal.super_admin || !current.is_super_admin() {
            return Err(TenantError::PermissionDenied(
                "context switching requires the super-admin capability".to_string(),
            ));
        }
        if current.actor_id() != principal.user_id {
            return Err(TenantError::PermissionDenied(
                "context belongs to a different principal".to_string(),
            ));
        }

        self.companies
            .get(target_company_id)
            .await?
            .ok_or(TenantError::NotFound(target_company_id))
    }

    async fn audit_switch(&self, principal: &Principal, entry: &ContextSwitchLogEntry) {
        let metadata = json!({
            "actor": principal.audit_identity(),
            "switch_id": entry.id,
            "previous_company_id": entry.previous_company_id,
            "target_company_id": entry.target_company_id,
            "reason": entry.reason,
            "outcome": entry.outcome.as_str(),
        });

        match &entry.outcome {
            SwitchOutcome::Success => {
                self.audit
                    .log_info(
                        AuditScope::Company(entry.target_company_id),
                        AuditEventType::ContextSwitched,
                        format!(
                            "Operator {} switched into company {}: {}",
                            principal.user_id, entry.target_company_id, entry.reason
                        ),
                        format!(
                            "انتقل المشرف {} إلى الشركة {}: {}",
                            principal.user_id, entry.target_company_id, entry.reason
                        ),
                        metadata,
                    )
                    .await;
            }
            SwitchOutcome::Denied(why) => {
                self.audit
                    .log_warning(
                        AuditScope::System,
                        AuditEventType::ContextSwitchDenied,
                        format!(
                            "Context switch by {} into {} denied: {}",
                            principal.user_id, entry.target_company_id, why
                        ),
                        format!(
                            "رُفض انتقال المستخدم {} إلى الشركة {}",
                            principal.user_id, entry.target_company_id
                        ),
                        metadata,
                    )
                    .await;
            }
            SwitchOutcome::NotFound => {
                self.audit
                    .log_warning(
                        AuditScope::System,
                        AuditEventType::ContextSwitchDenied,
                        format!(
                            "Context switch by {} failed: company {} not found",
                            principal.user_id, entry.target_company_id
                        ),
                        format!(
                            "فشل انتقال المستخدم {}: الشركة {} غير موجودة",
                            principal.user_id, entry.target_company_id
                        ),
                        metadata,
                    )
                    .await;
            }
        }
    }

    /// Companies that can be operated on at `at`, ordered by slug.
    pub async fn operational_companies(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<Company>, TenantError> {
        let mut companies: Vec<Company> = self
            .companies
            .list()
            .await?
            .into_iter()
            .filter(|c| c.is_operational_at(at))
            .collect();
        companies.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(companies)
    }

    /// Fails with [`TenantError::Suspended`] unless the company is operational
    /// at `at`.
    pub async fn ensure_operational(
        &self,
        company_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), TenantError> {
        let company = self
            .companies
            .get(company_id)
            .await?
            .ok_or(TenantError::NotFound(company_id))?;
        if company.is_operational_at(at) {
            Ok(())
        } else {
            Err(TenantError::Suspended {
                company_id,
                status: company.status,
            })
        }
    }

    /// Moves a company to `status`.
    ///
    /// Requires [`Permission::ManageCompany`] in that company's context, or
    /// an all-companies context. Both the change and a refusal are audited.
    #[instrument(skip(self, ctx), fields(actor = ctx.actor_id()))]
    pub async fn set_company_status(
        &self,
        ctx: &CompanyContext,
        company_id: Uuid,
        status: CompanyStatus,
        now: DateTime<Utc>,
    ) -> Result<Company, TenantError> {
        let in_scope = ctx.company_id().map_or(true, |own| own == company_id);
        if !ctx.has_permission(Permission::ManageCompany) || !in_scope {
            let err = TenantError::PermissionDenied(format!(
                "role {} cannot change the status of company {}",
                ctx.role(),
                company_id
            ));
            warn!(company_id = %company_id, error = %err, "Company status change refused");
            self.audit
                .log_warning(
                    ctx.audit_scope(),
                    AuditEventType::PermissionDenied,
                    format!(
                        "Refused status change of company {} to {} by {}",
                        company_id,
                        status.as_db_str(),
                        ctx.actor_id()
                    ),
                    format!(
                        "تم رفض تغيير حالة الشركة {} من قبل {}",
                        company_id,
                        ctx.actor_id()
                    ),
                    json!({
                        "actor": ctx.actor_id(),
                        "role": ctx.role(),
                        "permission": Permission::ManageCompany,
                        "target": company_id,
                        "operation": "set_status",
                    }),
                )
                .await;
            return Err(err);
        }

        let previous = self
            .companies
            .get(company_id)
            .await?
            .ok_or(TenantError::NotFound(company_id))?;
        let company = self.companies.set_status(company_id, status, now).await?;

        info!(
            company_id = %company_id,
            from = previous.status.as_db_str(),
            to = status.as_db_str(),
            "Company status changed"
        );
        self.audit
            .log_info(
                AuditScope::Company(company_id),
                AuditEventType::CompanyStatusChanged,
                format!(
                    "Company {} moved from {} to {}",
                    company.name,
                    previous.status.as_db_str(),
                    status.as_db_str()
                ),
                format!(
                    "تم تغيير حالة الشركة {} من {} إلى {}",
                    company.name,
                    previous.status.as_db_str(),
                    status.as_db_str()
                ),
                json!({
                    "actor": ctx.actor_id(),
                    "from": previous.status,
                    "to": status,
                }),
            )
            .await;
        Ok(company)
    }

    /// Returns the switch history of one principal, oldest first.
    pub async fn switch_log_for(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ContextSwitchLogEntry>, TenantError> {
        Ok(self.switch_log.list_for_principal(&principal.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mocks::{
        MockCompanyRepository, MockMembershipRepository, MockSwitchLogRepository,
    };
    use crate::tenant::{CompanyStatus, ContextScope};
    use chrono::{Duration, TimeZone};
    use lg_observability::MemoryAuditSink;

    struct Harness {
        resolver: TenantContextResolver,
        sink: Arc<MemoryAuditSink>,
        switch_log: Arc<MockSwitchLogRepository>,
    }

    fn harness(companies: Vec<Company>, memberships: Vec<Membership>) -> Harness {
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(AuditLogger::without_tracing(sink.clone()));
        let switch_log = Arc::new(MockSwitchLogRepository::new());
        let resolver = TenantContextResolver::new(
            Arc::new(MockCompanyRepository::with_companies(companies)),
            Arc::new(MockMembershipRepository::with_memberships(memberships)),
            switch_log.clone(),
            audit,
        );
        Harness {
            resolver,
            sink,
            switch_log,
        }
    }

    fn company(slug: &str) -> Company {
        Company::new(slug, slug).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_single_membership() {
        let acme = company("acme-homes");
        let h = harness(
            vec![acme.clone()],
            vec![Membership::new("u1", acme.id, Role::Manager)],
        );

        let ctx = h.resolver.resolve_context(&Principal::new("u1"), Utc::now()).await.unwrap();
        assert_eq!(ctx.scope(), ContextScope::Company(acme.id));
        assert_eq!(ctx.role(), Role::Manager);
        assert!(!ctx.is_privileged());

        let resolved = h
            .sink
            .entries_by_type(&AuditEventType::ContextResolved)
            .await;
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_prefers_claimed_company() {
        let first = company("first-co");
        let second = company("second-co");
        let mut early = Membership::new("u1", first.id, Role::Viewer);
        early.joined_at = Utc::now() - Duration::days(30);
        let late = Membership::new("u1", second.id, Role::Owner);
        let h = harness(vec![first.clone(), second.clone()], vec![early, late]);

        let default_ctx = h.resolver.resolve_context(&Principal::new("u1"), Utc::now()).await.unwrap();
        assert_eq!(default_ctx.company_id(), Some(first.id));

        let preferred = Principal::new("u1").with_preferred_company(second.id);
        let ctx = h.resolver.resolve_context(&preferred, Utc::now()).await.unwrap();
        assert_eq!(ctx.company_id(), Some(second.id));
        assert_eq!(ctx.role(), Role::Owner);
    }

    #[tokio::test]
    async fn test_resolve_without_membership_fails_authentication() {
        let h = harness(vec![], vec![]);
        let err = h
            .resolver
            .resolve_context(&Principal::new("stranger"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Authentication(_)));
        assert_eq!(
            h.sink
                .entries_by_type(&AuditEventType::ContextResolutionFailed)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown_company_fails_authentication() {
        let h = harness(
            vec![],
            vec![Membership::new("u1", Uuid::new_v4(), Role::Owner)],
        );
        let err = h.resolver.resolve_context(&Principal::new("u1"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, TenantError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_resolve_suspended_company() {
        let mut acme = company("acme-homes");
        acme.status = CompanyStatus::Suspended;
        let h = harness(
            vec![acme.clone()],
            vec![Membership::new("u1", acme.id, Role::Owner)],
        );

        let err = h.resolver.resolve_context(&Principal::new("u1"), Utc::now()).await.unwrap_err();
        assert_eq!(err.to_string(), "account suspended");
        assert!(matches!(err, TenantError::Suspended { company_id, .. } if company_id == acme.id));
    }

    #[tokio::test]
    async fn test_super_admin_resolves_all_companies() {
        let h = harness(vec![], vec![]);
        let ctx = h
            .resolver
            .resolve_context(&Principal::super_admin("ops"), Utc::now())
            .await
            .unwrap();
        assert!(ctx.is_privileged());
        assert_eq!(ctx.scope(), ContextScope::AllCompanies);
    }

    #[tokio::test]
    async fn test_switch_by_super_admin_is_logged() {
        let target = company("target-co");
        let h = harness(vec![target.clone()], vec![]);
        let operator = Principal::super_admin("ops");
        let base = h.resolver.resolve_context(&operator, Utc::now()).await.unwrap();

        let switched = h
            .resolver
            .switch_context(&operator, &base, target.id, "support ticket 42", Utc::now())
            .await
            .unwrap();

        assert_eq!(switched.scope(), ContextScope::Company(target.id));
        assert!(switched.is_super_admin());
        assert!(!switched.is_privileged());
        assert!(base.is_privileged());

        let log = h.resolver.switch_log_for(&operator).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, SwitchOutcome::Success);
        assert_eq!(log[0].previous_company_id, None);
        assert_eq!(log[0].reason, "support ticket 42");

        let trail = h.sink.entries_for_scope(AuditScope::Company(target.id)).await;
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].event_type, AuditEventType::ContextSwitched);
    }

    #[tokio::test]
    async fn test_switch_by_regular_user_is_denied_and_logged() {
        let own = company("own-co");
        let other = company("other-co");
        let h = harness(
            vec![own.clone(), other.clone()],
            vec![Membership::new("u1", own.id, Role::Owner)],
        );
        let user = Principal::new("u1");
        let ctx = h.resolver.resolve_context(&user, Utc::now()).await.unwrap();

        let err = h
            .resolver
            .switch_context(&user, &ctx, other.id, "curious", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::PermissionDenied(_)));
        assert_eq!(ctx.company_id(), Some(own.id));

        let log = h.switch_log.snapshot().await;
        assert_eq!(log.len(), 1);
        assert!(matches!(log[0].outcome, SwitchOutcome::Denied(_)));
        assert_eq!(log[0].previous_company_id, Some(own.id));
        assert_eq!(
            h.sink
                .entries_by_type(&AuditEventType::ContextSwitchDenied)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_switch_to_missing_company_is_logged_as_not_found() {
        let h = harness(vec![], vec![]);
        let operator = Principal::super_admin("ops");
        let base = h.resolver.resolve_context(&operator, Utc::now()).await.unwrap();

        let missing = Uuid::new_v4();
        let err = h
            .resolver
            .switch_context(&operator, &base, missing, "typo", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, TenantError::NotFound(missing));

        let log = h.resolver.switch_log_for(&operator).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, SwitchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_switch_log_count_is_monotonic() {
        let target = company("target-co");
        let h = harness(vec![target.clone()], vec![]);
        let operator = Principal::super_admin("ops");
        let base = h.resolver.resolve_context(&operator, Utc::now()).await.unwrap();

        let mut previous = 0;
        for attempt in 0..4 {
            let company_id = if attempt % 2 == 0 {
                target.id
            } else {
                Uuid::new_v4()
            };
            let _ = h
                .resolver
                .switch_context(&operator, &base, company_id, "rotation", Utc::now())
                .await;
            let count = h.resolver.switch_log_for(&operator).await.unwrap().len();
            assert_eq!(count, previous + 1);
            previous = count;
        }
    }

    #[tokio::test]
    async fn test_failed_log_persistence_blocks_switch() {
        let target = company("target-co");
        let h = harness(vec![target.clone()], vec![]);
        let operator = Principal::super_admin("ops");
        let base = h.resolver.resolve_context(&operator, Utc::now()).await.unwrap();

        h.switch_log.set_failing(true);
        let err = h
            .resolver
            .switch_context(&operator, &base, target.id, "maintenance", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Repository(_)));
        // The audit trail still records the attempt, as refused.
        let denied = h
            .sink
            .entries_by_type(&AuditEventType::ContextSwitchDenied)
            .await;
        assert_eq!(denied.len(), 1);
        assert!(h
            .sink
            .entries_by_type(&AuditEventType::ContextSwitched)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_owner_can_suspend_own_company() {
        let acme = company("acme-homes");
        let other = company("other-co");
        let h = harness(
            vec![acme.clone(), other.clone()],
            vec![Membership::new("u1", acme.id, Role::Owner)],
        );
        let owner = h
            .resolver
            .resolve_context(&Principal::new("u1"), Utc::now())
            .await
            .unwrap();

        let suspended = h
            .resolver
            .set_company_status(&owner, acme.id, CompanyStatus::Suspended, Utc::now())
            .await
            .unwrap();
        assert_eq!(suspended.status, CompanyStatus::Suspended);
        assert!(h
            .resolver
            .ensure_operational(acme.id, Utc::now())
            .await
            .is_err());

        let changed = h
            .sink
            .entries_by_type(&AuditEventType::CompanyStatusChanged)
            .await;
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].scope, AuditScope::Company(acme.id));
        assert_eq!(changed[0].metadata["from"], "active");
        assert_eq!(changed[0].metadata["to"], "suspended");

        let err = h
            .resolver
            .set_company_status(&owner, other.id, CompanyStatus::Suspended, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_manager_cannot_change_company_status() {
        let acme = company("acme-homes");
        let h = harness(
            vec![acme.clone()],
            vec![Membership::new("u1", acme.id, Role::Manager)],
        );
        let manager = h
            .resolver
            .resolve_context(&Principal::new("u1"), Utc::now())
            .await
            .unwrap();

        let err = h
            .resolver
            .set_company_status(&manager, acme.id, CompanyStatus::Suspended, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::PermissionDenied(_)));
        assert!(h
            .resolver
            .ensure_operational(acme.id, Utc::now())
            .await
            .is_ok());
        assert_eq!(
            h.sink
                .entries_by_type(&AuditEventType::PermissionDenied)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_resolution_follows_evaluation_time() {
        let trial_end = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let mut trial = company("trial-co");
        trial.update_status(CompanyStatus::Trial);
        trial.trial_ends_at = Some(trial_end);
        let h = harness(
            vec![trial.clone()],
            vec![Membership::new("u1", trial.id, Role::Owner)],
        );
        let user = Principal::new("u1");

        let before = trial_end - Duration::days(10);
        let ctx = h.resolver.resolve_context(&user, before).await.unwrap();
        assert_eq!(ctx.resolved_at(), before);

        let err = h
            .resolver
            .resolve_context(&user, trial_end + Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Suspended { .. }));
    }

    #[tokio::test]
    async fn test_switch_log_is_stamped_with_evaluation_time() {
        let target = company("target-co");
        let h = harness(vec![target.clone()], vec![]);
        let operator = Principal::super_admin("ops");
        let at = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();

        let base = h.resolver.resolve_context(&operator, at).await.unwrap();
        let switched = h
            .resolver
            .switch_context(&operator, &base, target.id, "audit replay", at)
            .await
            .unwrap();
        assert_eq!(switched.resolved_at(), at);

        let log = h.resolver.switch_log_for(&operator).await.unwrap();
        assert_eq!(log[0].timestamp, at);
    }

    #[tokio::test]
    async fn test_operational_companies_excludes_suspended_and_lapsed_trials() {
        let active = company("active-co");
        let mut suspended = company("suspended-co");
        suspended.update_status(CompanyStatus::Suspended);
        let mut lapsed = company("lapsed-co");
        lapsed.update_status(CompanyStatus::Trial);
        lapsed.trial_ends_at = Some(Utc::now() - Duration::days(1));
        let h = harness(vec![suspended.clone(), lapsed, active.clone()], vec![]);

        let companies = h.resolver.operational_companies(Utc::now()).await.unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].id, active.id);

        assert!(h.resolver.ensure_operational(active.id, Utc::now()).await.is_ok());
        assert!(matches!(
            h.resolver.ensure_operational(suspended.id, Utc::now()).await,
            Err(TenantError::Suspended { .. })
        ));
        assert!(matches!(
            h.resolver.ensure_operational(Uuid::new_v4(), Utc::now()).await,
            Err(TenantError::NotFound(_))
        ));
    }
}
