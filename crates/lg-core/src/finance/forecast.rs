//! Cash-flow forecast.

use super::health::assess_financial_health;
use super::FinancePolicy;
use crate::models::{
    partition_valid, CompanyRecord, Contract, MaintenanceExpense, MalformedRecordError, Payment,
};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Months forecast when the caller does not say otherwise.
pub const DEFAULT_FORECAST_HORIZON_MONTHS: u32 = 6;

/// Longest horizon a forecast covers; longer requests are clamped.
pub const MAX_FORECAST_HORIZON_MONTHS: u32 = 120;

/// One forecast month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthForecast {
    /// `YYYY-MM`.
    pub label: String,
    /// Rent scheduled to fall due in the month.
    pub expected: Decimal,
    /// `expected` scaled by the current collection rate, truncated to 2 dp.
    pub projected: Decimal,
    /// Maintenance spent in the same month one year earlier.
    pub expenses: Decimal,
}

/// Result of [`calculate_cash_flow_forecast`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowForecast {
    pub months: Vec<MonthForecast>,
    pub collection_rate: f64,
    pub skipped: Vec<MalformedRecordError>,
}

impl CashFlowForecast {
    pub fn labels(&self) -> Vec<String> {
        self.months.iter().map(|m| m.label.clone()).collect()
    }

    pub fn expected(&self) -> Vec<Decimal> {
        self.months.iter().map(|m| m.expected).collect()
    }

    pub fn projected(&self) -> Vec<Decimal> {
        self.months.iter().map(|m| m.projected).collect()
    }

    pub fn expenses(&self) -> Vec<Decimal> {
        self.months.iter().map(|m| m.expenses).collect()
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn month_index(origin: NaiveDate, date: NaiveDate) -> i64 {
    i64::from(date.year() - origin.year()) * 12 + i64::from(date.month()) - i64::from(origin.month())
}

/// Forecasts the `horizon_months` calendar months after the current one,
/// at most [`MAX_FORECAST_HORIZON_MONTHS`].
///
/// Installments of an active contract fall on `start + k * period` for
/// every `k` with the date inside `[start, end]`.
pub fn calculate_cash_flow_forecast(
    contracts: &[Contract],
    payments: &[Payment],
    maintenance: &[MaintenanceExpense],
    policy: &FinancePolicy,
    now: DateTime<Utc>,
    horizon_months: u32,
) -> CashFlowForecast {
    let health = assess_financial_health(payments, contracts, policy, now);
    let mut skipped = health.skipped;
    let (valid_expenses, skipped_expenses) = partition_valid(maintenance);
    skipped.extend(skipped_expenses);

    let rate = if health.metrics.payments_considered == 0 {
        Decimal::ONE
    } else {
        Decimal::from(health.metrics.paid_count) / Decimal::from(health.metrics.payments_considered)
    };

    let horizon_months = horizon_months.min(MAX_FORECAST_HORIZON_MONTHS);
    let current = first_of_month(now.date_naive());
    let starts: Vec<NaiveDate> = (1..=horizon_months)
        .filter_map(|i| current.checked_add_months(Months::new(i)))
        .collect();
    let (Some(&horizon_start), Some(&last_start)) = (starts.first(), starts.last()) else {
        return CashFlowForecast {
            months: Vec::new(),
            collection_rate: health.metrics.collection_rate,
            skipped,
        };
    };
    let horizon_end = last_start
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);

    let mut expected = vec![Decimal::ZERO; starts.len()];
    // Contracts were already validated (and reported) by the health pass.
    for contract in contracts
        .iter()
        .filter(|c| c.is_active() && c.validate().is_ok())
    {
        let period = contract.payment_frequency.months();
        for k in 0u32.. {
            let Some(due) = k
                .checked_mul(period)
                .and_then(|offset| contract.start_date.checked_add_months(Months::new(offset)))
            else {
                break;
            };
            if due > contract.end_date || due >= horizon_end {
                break;
            }
            if due < horizon_start {
                continue;
            }
            if let Some(slot) = usize::try_from(month_index(horizon_start, due))
                .ok()
                .and_then(|i| expected.get_mut(i))
            {
                *slot += contract.rent_amount;
            }
        }
    }

    let months = starts
        .iter()
        .zip(expected)
        .map(|(start, expected)| {
            let expenses = start
                .checked_sub_months(Months::new(12))
                .map(|prior| {
                    valid_expenses
                        .iter()
                        .filter(|e| first_of_month(e.incurred_on) == prior)
                        .map(|e| e.amount)
                        .sum()
                })
                .unwrap_or(Decimal::ZERO);
            MonthForecast {
                label: start.format("%Y-%m").to_string(),
                expected,
                // Truncated so the projection never exceeds what falls due.
                projected: (expected * rate)
                    .round_dp_with_strategy(2, RoundingStrategy::ToZero),
                expenses,
            }
        })
        .collect();

    CashFlowForecast {
        months,
        collection_rate: health.metrics.collection_rate,
        skipped,
    }
}
