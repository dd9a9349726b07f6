//! Ledger of delivered notification keys.

use super::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Remembers which de-duplication keys were already delivered per company.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Records that `key` was delivered for `company_id` at `sent_at`.
    async fn record_sent(
        &self,
        company_id: Uuid,
        key: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Returns true if `key` was delivered for `company_id` at or after `since`.
    async fn was_sent_since(
        &self,
        company_id: Uuid,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, DbError>;
}
