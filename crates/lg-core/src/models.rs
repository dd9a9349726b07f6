//! Company-scoped business records consumed by the financial engine.
//!
//! Records arrive from the document store through the tenant query
//! middleware. Shape problems that serde cannot catch (negative amounts,
//! inverted date ranges, dangling ids) are reported through
//! [`MalformedRecordError`] and the record is excluded from computations.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Collection holding payments.
pub const PAYMENTS: &str = "payments";
/// Collection holding contracts.
pub const CONTRACTS: &str = "contracts";
/// Collection holding tenant contacts.
pub const TENANT_CONTACTS: &str = "tenant_contacts";
/// Collection holding maintenance expenses.
pub const MAINTENANCE_EXPENSES: &str = "maintenance_expenses";

/// A record that was excluded from a computation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Malformed {kind} record '{id}': {reason}")]
pub struct MalformedRecordError {
    /// Record kind (collection name).
    pub kind: String,
    /// Record id, or `<unknown>` when the id itself could not be read.
    pub id: String,
    pub reason: String,
}

impl MalformedRecordError {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Common view over company-scoped records.
pub trait CompanyRecord {
    /// Collection the record lives in.
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn company_id(&self) -> Uuid;

    /// Checks invariants serde cannot express.
    fn validate(&self) -> Result<(), MalformedRecordError>;

    fn malformed(&self, reason: impl Into<String>) -> MalformedRecordError {
        MalformedRecordError::new(Self::KIND, self.id(), reason)
    }
}

/// Splits records into valid ones and the reasons the rest were skipped.
///
/// Each skipped record is logged at warn level.
pub fn partition_valid<T: CompanyRecord>(records: &[T]) -> (Vec<&T>, Vec<MalformedRecordError>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for record in records {
        match record.validate() {
            Ok(()) => valid.push(record),
            Err(err) => {
                warn!(kind = %err.kind, id = %err.id, reason = %err.reason, "Skipping malformed record");
                skipped.push(err);
            }
        }
    }
    (valid, skipped)
}

/// Text in both supported languages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizedText {
    pub en: String,
    pub ar: String,
}

impl LocalizedText {
    pub fn new(en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            ar: ar.into(),
        }
    }

    /// Picks the text for a locale, defaulting to Arabic.
    pub fn for_locale(&self, locale: &str) -> &str {
        if locale.starts_with("en") {
            &self.en
        } else {
            &self.ar
        }
    }
}

/// Stored payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Due,
    Overdue,
    Paid,
}

/// One rent installment owed under a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub company_id: Uuid,
    pub contract_id: String,
    /// Name of the renter as shown on statements.
    pub tenant_name: String,
    /// Human-readable unit reference, e.g. "Tower B / 1204".
    pub unit_ref: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub method: Option<String>,
}

impl Payment {
    /// Status at evaluation time.
    ///
    /// Paid stays paid. Anything else is overdue once `today` is past the
    /// due date, regardless of what the store says.
    pub fn effective_status(&self, today: NaiveDate) -> PaymentStatus {
        match self.status {
            PaymentStatus::Paid => PaymentStatus::Paid,
            _ if today > self.due_date => PaymentStatus::Overdue,
            _ => PaymentStatus::Due,
        }
    }

    /// Whole days past the due date (zero or negative when not yet due).
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days()
    }
}

impl CompanyRecord for Payment {
    const KIND: &'static str = PAYMENTS;

    fn id(&self) -> &str {
        &self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn validate(&self) -> Result<(), MalformedRecordError> {
        if self.id.trim().is_empty() {
            return Err(self.malformed("missing id"));
        }
        if self.contract_id.trim().is_empty() {
            return Err(self.malformed("missing contract reference"));
        }
        if self.amount.is_sign_negative() {
            return Err(self.malformed(format!("negative amount {}", self.amount)));
        }
        Ok(())
    }
}

/// How often rent falls due under a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl PaymentFrequency {
    /// Months between two installments.
    pub fn months(&self) -> u32 {
        match self {
            PaymentFrequency::Monthly => 1,
            PaymentFrequency::Quarterly => 3,
            PaymentFrequency::SemiAnnual => 6,
            PaymentFrequency::Annual => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    #[default]
    Active,
    Ended,
    Suspended,
}

/// A lease between a company and a renter for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub company_id: Uuid,
    pub tenant_contact_id: String,
    pub property_id: String,
    pub unit_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Rent owed per installment.
    pub rent_amount: Decimal,
    pub payment_frequency: PaymentFrequency,
    #[serde(default)]
    pub status: ContractStatus,
}

impl Contract {
    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    /// Days from `today` until the contract ends (negative once ended).
    pub fn days_until_end(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }
}

impl CompanyRecord for Contract {
    const KIND: &'static str = CONTRACTS;

    fn id(&self) -> &str {
        &self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn validate(&self) -> Result<(), MalformedRecordError> {
        if self.id.trim().is_empty() {
            return Err(self.malformed("missing id"));
        }
        if self.end_date < self.start_date {
            return Err(self.malformed(format!(
                "end date {} precedes start date {}",
                self.end_date, self.start_date
            )));
        }
        if self.rent_amount.is_sign_negative() {
            return Err(self.malformed(format!("negative rent {}", self.rent_amount)));
        }
        Ok(())
    }
}

fn default_locale() -> String {
    "ar".to_string()
}

/// The renter a contract belongs to and messages are addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContact {
    pub id: String,
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_locale")]
    pub preferred_locale: String,
}

impl CompanyRecord for TenantContact {
    const KIND: &'static str = TENANT_CONTACTS;

    fn id(&self) -> &str {
        &self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn validate(&self) -> Result<(), MalformedRecordError> {
        if self.id.trim().is_empty() {
            return Err(self.malformed("missing id"));
        }
        if self.name.trim().is_empty() {
            return Err(self.malformed("missing name"));
        }
        Ok(())
    }
}

/// Money spent maintaining a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceExpense {
    pub id: String,
    pub company_id: Uuid,
    pub property_id: String,
    pub incurred_on: NaiveDate,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl CompanyRecord for MaintenanceExpense {
    const KIND: &'static str = MAINTENANCE_EXPENSES;

    fn id(&self) -> &str {
        &self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn validate(&self) -> Result<(), MalformedRecordError> {
        if self.id.trim().is_empty() {
            return Err(self.malformed("missing id"));
        }
        if self.amount.is_sign_negative() {
            return Err(self.malformed(format!("negative amount {}", self.amount)));
        }
        Ok(())
    }
}
