//! Company status and settings types.

use serde::{Deserialize, Serialize};

/// Default number of days after the due date before a payment escalates.
pub const DEFAULT_GRACE_PERIOD_DAYS: u32 = 5;
/// Default width of one escalation level in days.
pub const DEFAULT_ESCALATION_INTERVAL_DAYS: u32 = 15;
/// Default overdue age that counts as severe.
pub const DEFAULT_SEVERE_THRESHOLD_DAYS: u32 = 60;
/// Default look-back window for health assessment.
pub const DEFAULT_HEALTH_WINDOW_DAYS: u32 = 90;
/// Default look-ahead for contract renewal notices.
pub const DEFAULT_RENEWAL_LOOKAHEAD_DAYS: u32 = 30;

/// Lifecycle status of a company.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    /// Paying customer, fully operational.
    #[default]
    Active,
    /// Suspended (billing issue, policy violation). No operations permitted.
    Suspended,
    /// Evaluation period; operational until the trial ends.
    Trial,
}

impl CompanyStatus {
    /// Returns the store-compatible string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CompanyStatus::Active => "active",
            CompanyStatus::Suspended => "suspended",
            CompanyStatus::Trial => "trial",
        }
    }

    /// Returns true if the status itself permits operations.
    ///
    /// A trial company additionally needs an unexpired trial, see
    /// [`super::Company::is_operational_at`].
    pub fn is_operational(&self) -> bool {
        matches!(self, CompanyStatus::Active | CompanyStatus::Trial)
    }
}

impl std::fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompanyStatus::Active => write!(f, "Active"),
            CompanyStatus::Suspended => write!(f, "Suspended"),
            CompanyStatus::Trial => write!(f, "Trial"),
        }
    }
}

/// Per-company configuration that drives the financial engine and
/// message rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompanySettings {
    /// Days after the due date during which a payment is "within grace".
    pub grace_period_days: u32,
    /// Days per escalation level.
    pub escalation_interval_days: u32,
    /// Overdue age at which a payment counts as severely overdue.
    pub severe_threshold_days: u32,
    /// Look-back window for health assessment.
    pub health_window_days: u32,
    /// Look-ahead for contract renewal notices.
    pub renewal_lookahead_days: u32,
    /// ISO 4217 currency code used in messages.
    pub currency: String,
    /// Default locale for outbound messages ("ar" or "en").
    pub locale: String,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
            escalation_interval_days: DEFAULT_ESCALATION_INTERVAL_DAYS,
            severe_threshold_days: DEFAULT_SEVERE_THRESHOLD_DAYS,
            health_window_days: DEFAULT_HEALTH_WINDOW_DAYS,
            renewal_lookahead_days: DEFAULT_RENEWAL_LOOKAHEAD_DAYS,
            currency: "SAR".to_string(),
            locale: "ar".to_string(),
        }
    }
}
