//! Portfolio health assessment.

use super::rules::evaluate_rules;
use super::FinancePolicy;
use crate::models::{
    partition_valid, CompanyRecord, Contract, LocalizedText, MalformedRecordError, Payment,
    PaymentStatus,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Raw numbers the recommendation rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Payments due inside the window.
    pub payments_considered: usize,
    pub paid_count: usize,
    /// `paid_count / payments_considered`; 1.0 for an empty window.
    pub collection_rate: f64,
    pub total_due_amount: Decimal,
    pub overdue_amount: Decimal,
    /// `overdue_amount / total_due_amount`; 0.0 for an empty window.
    pub overdue_percentage: f64,
    /// Active contracts ending within the renewal look-ahead.
    pub expiring_contracts: usize,
}

/// Result of [`assess_financial_health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialHealth {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub metrics: HealthMetrics,
    pub recommendations: Vec<LocalizedText>,
    pub skipped: Vec<MalformedRecordError>,
}

/// Scores the payments due in `[today - health_window_days, today]`.
pub fn assess_financial_health(
    payments: &[Payment],
    contracts: &[Contract],
    policy: &FinancePolicy,
    now: DateTime<Utc>,
) -> FinancialHealth {
    let today = now.date_naive();
    let window_start = today
        .checked_sub_days(Days::new(u64::from(policy.health_window_days)))
        .unwrap_or(NaiveDate::MIN);

    let (valid_contracts, mut skipped) = partition_valid(contracts);
    let known_contracts: HashSet<&str> = contracts.iter().map(|c| c.id.as_str()).collect();

    let (valid_payments, skipped_payments) = partition_valid(payments);
    skipped.extend(skipped_payments);

    let mut considered = 0usize;
    let mut paid_count = 0usize;
    let mut total_due = Decimal::ZERO;
    let mut overdue = Decimal::ZERO;

    for payment in valid_payments {
        if payment.due_date < window_start || payment.due_date > today {
            continue;
        }
        if !known_contracts.contains(payment.contract_id.as_str()) {
            let err = payment.malformed(format!(
                "references unknown contract '{}'",
                payment.contract_id
            ));
            warn!(id = %err.id, reason = %err.reason, "Skipping malformed record");
            skipped.push(err);
            continue;
        }

        considered += 1;
        total_due += payment.amount;
        match payment.effective_status(today) {
            PaymentStatus::Paid => paid_count += 1,
            PaymentStatus::Overdue => overdue += payment.amount,
            PaymentStatus::Due => {}
        }
    }

    let collection_rate = if considered == 0 {
        1.0
    } else {
        paid_count as f64 / considered as f64
    };
    let overdue_percentage = if total_due.is_zero() {
        0.0
    } else {
        (overdue / total_due).to_f64().unwrap_or(0.0)
    };

    let lookahead = i64::from(policy.renewal_lookahead_days);
    let expiring_contracts = valid_contracts
        .iter()
        .filter(|c| c.is_active())
        .filter(|c| (0..=lookahead).contains(&c.days_until_end(today)))
        .count();

    let metrics = HealthMetrics {
        payments_considered: considered,
        paid_count,
        collection_rate,
        total_due_amount: total_due,
        overdue_amount: overdue,
        overdue_percentage,
        expiring_contracts,
    };
    let recommendations = evaluate_rules(&policy.recommendation_rules, &metrics);

    debug!(
        considered,
        paid_count,
        collection_rate,
        overdue_percentage,
        skipped = skipped.len(),
        "Financial health assessed"
    );

    FinancialHealth {
        window_start,
        window_end: today,
        metrics,
        recommendations,
        skipped,
    }
}
