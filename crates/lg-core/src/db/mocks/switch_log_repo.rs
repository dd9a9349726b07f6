//! Mock implementation of SwitchLogRepository for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::{DbError, SwitchLogRepository};
use crate::tenant::ContextSwitchLogEntry;

/// Append-only in-memory switch log.
#[derive(Default)]
pub struct MockSwitchLogRepository {
    entries: Arc<RwLock<Vec<ContextSwitchLogEntry>>>,
    failing: AtomicBool,
}

impl MockSwitchLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent appends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All entries in append order.
    pub async fn snapshot(&self) -> Vec<ContextSwitchLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl SwitchLogRepository for MockSwitchLogRepository {
    async fn append(&self, entry: &ContextSwitchLogEntry) -> Result<(), DbError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DbError::Connection("switch log unavailable".to_string()));
        }
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_for_principal(
        &self,
        principal_id: &str,
    ) -> Result<Vec<ContextSwitchLogEntry>, DbError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.principal_id == principal_id)
            .cloned()
            .collect())
    }
}
