//! Payment issue classification.
//!
//! An effectively overdue payment `d` days past due falls into exactly one
//! of two buckets:
//! - `within_grace` for `1 <= d <= grace_period_days`
//! - `needs_escalation` for `d > grace_period_days`, at level
//!   `max(1, d / escalation_interval_days)`
//!
//! `severely_overdue` (`d >= severe_threshold_days`) is a separate lens and
//! overlaps the escalation bucket.

use super::FinancePolicy;
use crate::models::{partition_valid, MalformedRecordError, Payment, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An overdue payment with its age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverduePayment {
    pub payment: Payment,
    pub days_overdue: i64,
}

/// A payment past its grace period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEntry {
    pub payment: Payment,
    pub days_overdue: i64,
    /// Always at least 1.
    pub level: u32,
}

/// Result of [`detect_payment_issues`]. Every list is sorted by (due date, id).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentIssueClassification {
    pub within_grace: Vec<OverduePayment>,
    pub severely_overdue: Vec<OverduePayment>,
    pub needs_escalation: Vec<EscalationEntry>,
    pub skipped: Vec<MalformedRecordError>,
}

impl PaymentIssueClassification {
    /// True when nothing is overdue.
    pub fn is_clear(&self) -> bool {
        self.within_grace.is_empty() && self.needs_escalation.is_empty()
    }
}

/// Escalation level for a payment `days_overdue` days past due.
pub(crate) fn escalation_level(days_overdue: i64, interval_days: u32) -> u32 {
    let level = days_overdue / i64::from(interval_days.max(1));
    u32::try_from(level).unwrap_or(u32::MAX).max(1)
}

/// Classifies overdue payments.
pub fn detect_payment_issues(
    payments: &[Payment],
    policy: &FinancePolicy,
    now: DateTime<Utc>,
) -> PaymentIssueClassification {
    let today = now.date_naive();
    let grace = i64::from(policy.grace_period_days);
    let severe = i64::from(policy.severe_threshold_days);

    let (valid, skipped) = partition_valid(payments);
    let mut overdue: Vec<&Payment> = valid
        .into_iter()
        .filter(|p| p.effective_status(today) == PaymentStatus::Overdue)
        .collect();
    overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));

    let mut result = PaymentIssueClassification {
        skipped,
        ..Default::default()
    };

    for payment in overdue {
        let days_overdue = payment.days_overdue(today);
        if days_overdue <= 0 {
            continue;
        }

        if days_overdue <= grace {
            result.within_grace.push(OverduePayment {
                payment: payment.clone(),
                days_overdue,
            });
        } else {
            result.needs_escalation.push(EscalationEntry {
                payment: payment.clone(),
                days_overdue,
                level: escalation_level(days_overdue, policy.escalation_interval_days),
            });
        }

        if days_overdue >= severe {
            result.severely_overdue.push(OverduePayment {
                payment: payment.clone(),
                days_overdue,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn overdue_by(id: &str, days: u64) -> Payment {
        Payment {
            id: id.to_string(),
            company_id: Uuid::nil(),
            contract_id: "c-1".to_string(),
            tenant_name: "Tenant".to_string(),
            unit_ref: "A-1".to_string(),
            due_date: now().date_naive() - Days::new(days),
            amount: Decimal::from(1200),
            status: PaymentStatus::Due,
            paid_at: None,
            method: None,
        }
    }

    fn policy(grace: u32, interval: u32) -> FinancePolicy {
        FinancePolicy {
            grace_period_days: grace,
            escalation_interval_days: interval,
            ..FinancePolicy::default()
        }
    }

    #[test]
    fn test_grace_boundary() {
        let payments = vec![overdue_by("on-boundary", 10), overdue_by("past-boundary", 11)];
        let result = detect_payment_issues(&payments, &policy(10, 15), now());

        assert_eq!(result.within_grace.len(), 1);
        assert_eq!(result.within_grace[0].payment.id, "on-boundary");
        assert_eq!(result.needs_escalation.len(), 1);
        assert_eq!(result.needs_escalation[0].payment.id, "past-boundary");
    }

    #[test]
    fn test_escalation_levels() {
        let payments = vec![overdue_by("d16", 16), overdue_by("d31", 31)];
        let result = detect_payment_issues(&payments, &policy(5, 15), now());

        let levels: Vec<(&str, u32)> = result
            .needs_escalation
            .iter()
            .map(|e| (e.payment.id.as_str(), e.level))
            .collect();
        // Sorted by due date: the older payment comes first.
        assert_eq!(levels, vec![("d31", 2), ("d16", 1)]);
    }

    #[test]
    fn test_level_is_clamped_to_one() {
        let result = detect_payment_issues(&[overdue_by("d7", 7)], &policy(5, 15), now());
        assert_eq!(result.needs_escalation[0].level, 1);
        assert_eq!(escalation_level(3, 15), 1);
        assert_eq!(escalation_level(45, 15), 3);
    }

    #[test]
    fn test_severe_overlaps_escalation() {
        let result = detect_payment_issues(&[overdue_by("old", 75)], &FinancePolicy::default(), now());
        assert_eq!(result.severely_overdue.len(), 1);
        assert_eq!(result.needs_escalation.len(), 1);
        assert_eq!(result.needs_escalation[0].level, 5);
        assert!(result.within_grace.is_empty());
    }

    #[test]
    fn test_paid_and_not_yet_due_are_ignored() {
        let mut paid = overdue_by("paid", 40);
        paid.status = PaymentStatus::Paid;
        let mut future = overdue_by("future", 0);
        future.due_date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let due_today = overdue_by("today", 0);

        let result = detect_payment_issues(&[paid, future, due_today], &FinancePolicy::default(), now());
        assert!(result.is_clear());
        assert!(result.severely_overdue.is_empty());
    }

    #[test]
    fn test_every_overdue_payment_lands_in_exactly_one_bucket() {
        let payments: Vec<Payment> = (1..=90)
            .map(|d| overdue_by(&format!("p{:02}", d), d))
            .collect();
        let result = detect_payment_issues(&payments, &FinancePolicy::default(), now());
        assert_eq!(result.within_grace.len() + result.needs_escalation.len(), 90);
        assert!(result
            .within_grace
            .iter()
            .all(|g| !result.needs_escalation.iter().any(|e| e.payment.id == g.payment.id)));
    }

    #[test]
    fn test_output_is_independent_of_input_order() {
        let mut payments = vec![
            overdue_by("b", 20),
            overdue_by("a", 20),
            overdue_by("c", 3),
            overdue_by("d", 70),
        ];
        let first = detect_payment_issues(&payments, &FinancePolicy::default(), now());
        payments.reverse();
        let second = detect_payment_issues(&payments, &FinancePolicy::default(), now());
        assert_eq!(first, second);
        assert_eq!(first.needs_escalation[1].payment.id, "a");
    }

    #[test]
    fn test_malformed_payment_is_skipped() {
        let mut broken = overdue_by("broken", 12);
        broken.amount = Decimal::from(-1);
        let result = detect_payment_issues(&[broken], &FinancePolicy::default(), now());
        assert!(result.is_clear());
        assert_eq!(result.skipped.len(), 1);
    }
}
