//! In-memory delivery ledger.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::automation::DEFAULT_LEDGER_RETENTION_HOURS;
use crate::db::{DbError, DeliveryLedger};

/// Keeps the latest delivery time per (company, key).
///
/// Entries older than the retention window, measured from the newest
/// recorded delivery, are dropped on every write.
pub struct MemoryDeliveryLedger {
    sent: RwLock<HashMap<(Uuid, String), DateTime<Utc>>>,
    retention: Duration,
}

impl Default for MemoryDeliveryLedger {
    fn default() -> Self {
        Self::with_retention(Duration::hours(DEFAULT_LEDGER_RETENTION_HOURS))
    }
}

impl MemoryDeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that forgets deliveries older than `retention`. Should be at
    /// least the dispatcher's suppression window.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            sent: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Number of keys currently held, across companies.
    pub async fn len(&self) -> usize {
        self.sent.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sent.read().await.is_empty()
    }

    /// Number of distinct keys recorded for a company.
    pub async fn count_for(&self, company_id: Uuid) -> usize {
        self.sent
            .read()
            .await
            .keys()
            .filter(|(company, _)| *company == company_id)
            .count()
    }
}

#[async_trait]
impl DeliveryLedger for MemoryDeliveryLedger {
    async fn record_sent(
        &self,
        company_id: Uuid,
        key: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut sent = self.sent.write().await;
        let newest = sent.values().copied().max().map_or(sent_at, |at| at.max(sent_at));
        let cutoff = newest - self.retention;
        sent.retain(|_, at| *at >= cutoff);

        let slot = sent.entry((company_id, key.to_string())).or_insert(sent_at);
        if sent_at > *slot {
            *slot = sent_at;
        }
        Ok(())
    }

    async fn was_sent_since(
        &self,
        company_id: Uuid,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let sent = self.sent.read().await;
        Ok(sent
            .get(&(company_id, key.to_string()))
            .is_some_and(|at| *at >= since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_keys_are_per_company() {
        let ledger = MemoryDeliveryLedger::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();

        ledger.record_sent(a, "k1", now).await.unwrap();
        assert!(ledger
            .was_sent_since(a, "k1", now - Duration::hours(1))
            .await
            .unwrap());
        assert!(!ledger
            .was_sent_since(b, "k1", now - Duration::hours(1))
            .await
            .unwrap());
        assert_eq!(ledger.count_for(a).await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_pruned_on_write() {
        let ledger = MemoryDeliveryLedger::with_retention(Duration::hours(20));
        let a = Uuid::new_v4();
        let now = Utc::now();

        ledger
            .record_sent(a, "old", now - Duration::days(2))
            .await
            .unwrap();
        ledger
            .record_sent(a, "recent", now - Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(ledger.len().await, 1);

        ledger.record_sent(a, "new", now).await.unwrap();
        assert_eq!(ledger.len().await, 2);
        assert!(ledger
            .was_sent_since(a, "recent", now - Duration::hours(20))
            .await
            .unwrap());
        assert!(!ledger
            .was_sent_since(a, "old", now - Duration::days(3))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_old_deliveries_fall_outside_window() {
        let ledger = MemoryDeliveryLedger::new();
        let a = Uuid::new_v4();
        let now = Utc::now();
        ledger
            .record_sent(a, "k1", now - Duration::days(3))
            .await
            .unwrap();
        assert!(!ledger
            .was_sent_since(a, "k1", now - Duration::days(1))
            .await
            .unwrap());
    }
}
