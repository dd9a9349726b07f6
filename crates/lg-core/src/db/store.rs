//! Company-scoped document store.
//!
//! The store only accepts [`ScopedQuery`] and [`ScopedWrite`] values. Both
//! can only be built by the tenant query middleware in [`crate::scope`],
//! so an unscoped read or an unstamped write does not type-check.

use super::DbError;
use crate::scope::{ScopedQuery, ScopedWrite};
use async_trait::async_trait;
use serde_json::Value;

/// Field every company-scoped document carries.
pub const COMPANY_ID_FIELD: &str = "company_id";
/// Field holding the document id.
pub const ID_FIELD: &str = "id";

/// Document store behind the tenant query middleware.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every document matching the scoped query.
    async fn fetch(&self, query: &ScopedQuery) -> Result<Vec<Value>, DbError>;

    /// Gets one document by id, without any tenant filter.
    ///
    /// Callers go through [`crate::scope::ScopedStore::get`], which verifies
    /// the owner of the returned document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError>;

    /// Inserts or replaces a document and returns its id.
    async fn put(&self, write: &ScopedWrite) -> Result<String, DbError>;

    /// Deletes a document. Returns false if it did not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, DbError>;
}
