//! Financial behavior engine.
//!
//! Pure functions over company-scoped records:
//! - [`assess_financial_health`]: collection rate, overdue exposure, recommendations
//! - [`detect_payment_issues`]: grace / escalation / severe classification
//! - [`calculate_cash_flow_forecast`]: expected and projected income per month
//!
//! Every function takes `now` explicitly, performs no I/O, and never
//! mutates its inputs. Records that fail validation are skipped, logged
//! at warn level, and returned in the result's `skipped` list so callers
//! can forward them to the audit trail.

mod forecast;
mod health;
mod issues;
pub mod rules;

pub use forecast::{
    calculate_cash_flow_forecast, CashFlowForecast, MonthForecast, DEFAULT_FORECAST_HORIZON_MONTHS,
    MAX_FORECAST_HORIZON_MONTHS,
};
pub use health::{assess_financial_health, FinancialHealth, HealthMetrics};
pub use issues::{detect_payment_issues, EscalationEntry, OverduePayment, PaymentIssueClassification};
pub use rules::{default_recommendation_rules, HealthCondition, RecommendationRule};

use crate::tenant::CompanySettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for invalid finance policies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid finance policy: {field} must be at least 1, got {value}")]
    NonPositive { field: &'static str, value: u32 },
}

/// Thresholds driving the engine, derived from [`CompanySettings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancePolicy {
    pub grace_period_days: u32,
    pub escalation_interval_days: u32,
    pub severe_threshold_days: u32,
    pub health_window_days: u32,
    pub renewal_lookahead_days: u32,
    /// Ordered recommendation table.
    pub recommendation_rules: Vec<RecommendationRule>,
}

impl Default for FinancePolicy {
    fn default() -> Self {
        let settings = CompanySettings::default();
        Self {
            grace_period_days: settings.grace_period_days,
            escalation_interval_days: settings.escalation_interval_days,
            severe_threshold_days: settings.severe_threshold_days,
            health_window_days: settings.health_window_days,
            renewal_lookahead_days: settings.renewal_lookahead_days,
            recommendation_rules: default_recommendation_rules(),
        }
    }
}

impl FinancePolicy {
    /// Builds a validated policy from company settings with the default rule table.
    pub fn from_settings(settings: &CompanySettings) -> Result<Self, PolicyError> {
        let policy = Self {
            grace_period_days: settings.grace_period_days,
            escalation_interval_days: settings.escalation_interval_days,
            severe_threshold_days: settings.severe_threshold_days,
            health_window_days: settings.health_window_days,
            renewal_lookahead_days: settings.renewal_lookahead_days,
            recommendation_rules: default_recommendation_rules(),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Checks that every interval is at least one day.
    ///
    /// A zero grace period is allowed: payments escalate the day after
    /// they fall due.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let intervals = [
            ("escalation_interval_days", self.escalation_interval_days),
            ("severe_threshold_days", self.severe_threshold_days),
            ("health_window_days", self.health_window_days),
            ("renewal_lookahead_days", self.renewal_lookahead_days),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(PolicyError::NonPositive { field, value });
            }
        }
        Ok(())
    }

    pub fn with_rules(mut self, rules: Vec<RecommendationRule>) -> Self {
        self.recommendation_rules = rules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_default_settings() {
        let policy = FinancePolicy::from_settings(&CompanySettings::default()).unwrap();
        assert_eq!(policy, FinancePolicy::default());
        assert_eq!(policy.grace_period_days, 5);
        assert_eq!(policy.escalation_interval_days, 15);
    }

    #[test]
    fn test_zero_escalation_interval_is_rejected() {
        let settings = CompanySettings {
            escalation_interval_days: 0,
            ..Default::default()
        };
        let err = FinancePolicy::from_settings(&settings).unwrap_err();
        assert_eq!(
            err,
            PolicyError::NonPositive {
                field: "escalation_interval_days",
                value: 0
            }
        );
    }

    #[test]
    fn test_zero_grace_is_allowed() {
        let settings = CompanySettings {
            grace_period_days: 0,
            ..Default::default()
        };
        assert!(FinancePolicy::from_settings(&settings).is_ok());
    }
}
