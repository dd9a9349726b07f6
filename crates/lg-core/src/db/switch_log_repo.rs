//! Context switch log repository.

use super::DbError;
use crate::tenant::ContextSwitchLogEntry;
use async_trait::async_trait;

/// Append-only store for context switch attempts.
#[async_trait]
pub trait SwitchLogRepository: Send + Sync {
    /// Appends one entry. Existing entries are never modified.
    async fn append(&self, entry: &ContextSwitchLogEntry) -> Result<(), DbError>;

    /// Lists the entries of one principal, oldest first.
    async fn list_for_principal(
        &self,
        principal_id: &str,
    ) -> Result<Vec<ContextSwitchLogEntry>, DbError>;

    /// Counts the entries of one principal.
    async fn count_for_principal(&self, principal_id: &str) -> Result<u64, DbError> {
        Ok(self.list_for_principal(principal_id).await?.len() as u64)
    }
}
