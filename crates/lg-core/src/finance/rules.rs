//! Recommendation rules for financial health.
//!
//! Recommendations are data, not code: an ordered table of
//! [`RecommendationRule`]s evaluated against [`HealthMetrics`]. Adding a
//! recommendation means adding a row; the evaluation loop stays the same.

use super::health::HealthMetrics;
use crate::models::LocalizedText;
use serde::{Deserialize, Serialize};

/// A recommendation emitted when its condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    /// Unique name for this rule.
    pub name: String,
    pub condition: HealthCondition,
    pub message: LocalizedText,
    /// Whether this rule is enabled.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RecommendationRule {
    pub fn new(name: &str, condition: HealthCondition, message: LocalizedText) -> Self {
        Self {
            name: name.to_string(),
            condition,
            message,
            enabled: true,
        }
    }

    /// Checks if this rule fires for the given metrics.
    pub fn matches(&self, metrics: &HealthMetrics) -> bool {
        self.enabled && self.condition.evaluate(metrics)
    }
}

/// Conditions over health metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCondition {
    /// Collection rate strictly below the threshold (0.0-1.0).
    CollectionRateBelow(f64),
    /// Overdue share of amounts due strictly above the threshold (0.0-1.0).
    OverduePercentageAbove(f64),
    /// At least this many contracts end within the renewal look-ahead.
    ExpiringContractsAtLeast(usize),
    /// Nothing fell due inside the window.
    NoPaymentsInWindow,
    /// All sub-conditions must match.
    And(Vec<HealthCondition>),
    /// Any sub-condition must match.
    Or(Vec<HealthCondition>),
    /// Sub-condition must NOT match.
    Not(Box<HealthCondition>),
    /// Always true.
    Always,
}

impl HealthCondition {
    /// Evaluates this condition against the given metrics.
    pub fn evaluate(&self, metrics: &HealthMetrics) -> bool {
        match self {
            HealthCondition::CollectionRateBelow(threshold) => metrics.collection_rate < *threshold,

            HealthCondition::OverduePercentageAbove(threshold) => {
                metrics.overdue_percentage > *threshold
            }

            HealthCondition::ExpiringContractsAtLeast(count) => {
                metrics.expiring_contracts >= *count
            }

            HealthCondition::NoPaymentsInWindow => metrics.payments_considered == 0,

            HealthCondition::And(conditions) => conditions.iter().all(|c| c.evaluate(metrics)),

            HealthCondition::Or(conditions) => conditions.iter().any(|c| c.evaluate(metrics)),

            HealthCondition::Not(condition) => !condition.evaluate(metrics),

            HealthCondition::Always => true,
        }
    }

    pub fn not(condition: HealthCondition) -> Self {
        HealthCondition::Not(Box::new(condition))
    }
}

/// Evaluates rules in order and returns the messages of those that fire.
pub fn evaluate_rules(rules: &[RecommendationRule], metrics: &HealthMetrics) -> Vec<LocalizedText> {
    rules
        .iter()
        .filter(|rule| rule.matches(metrics))
        .map(|rule| rule.message.clone())
        .collect()
}

/// The built-in recommendation table.
pub fn default_recommendation_rules() -> Vec<RecommendationRule> {
    vec![
        RecommendationRule::new(
            "no_payments_in_window",
            HealthCondition::NoPaymentsInWindow,
            LocalizedText::new(
                "No payments fell due in the review window. Check that payment schedules were generated for active contracts.",
                "لم تستحق أي دفعات خلال فترة المراجعة. تحقق من إنشاء جداول الدفع للعقود السارية.",
            ),
        ),
        RecommendationRule::new(
            "tighten_collections",
            HealthCondition::And(vec![
                HealthCondition::not(HealthCondition::NoPaymentsInWindow),
                HealthCondition::CollectionRateBelow(0.85),
            ]),
            LocalizedText::new(
                "Collection rate is below 85%. Send reminders earlier and follow up on late tenants by phone.",
                "نسبة التحصيل أقل من 85%. أرسل التذكيرات مبكراً وتابع المستأجرين المتأخرين هاتفياً.",
            ),
        ),
        RecommendationRule::new(
            "overdue_exposure_high",
            HealthCondition::OverduePercentageAbove(0.15),
            LocalizedText::new(
                "More than 15% of amounts due are overdue. Prioritise the oldest balances and consider payment plans.",
                "أكثر من 15% من المبالغ المستحقة متأخرة. ابدأ بالأرصدة الأقدم وفكّر في خطط سداد.",
            ),
        ),
        RecommendationRule::new(
            "renewals_pending",
            HealthCondition::ExpiringContractsAtLeast(1),
            LocalizedText::new(
                "Some contracts expire soon. Start renewal conversations to avoid vacancies.",
                "بعض العقود ستنتهي قريباً. ابدأ مناقشات التجديد لتجنب شغور الوحدات.",
            ),
        ),
        RecommendationRule::new(
            "healthy_portfolio",
            HealthCondition::And(vec![
                HealthCondition::not(HealthCondition::NoPaymentsInWindow),
                HealthCondition::not(HealthCondition::CollectionRateBelow(0.95)),
                HealthCondition::not(HealthCondition::OverduePercentageAbove(0.05)),
            ]),
            LocalizedText::new(
                "Collections are healthy. Keep the current reminder schedule.",
                "التحصيل في وضع جيد. حافظ على جدول التذكيرات الحالي.",
            ),
        ),
    ]
}
