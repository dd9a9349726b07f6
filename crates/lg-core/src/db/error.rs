//! Store error types.

use thiserror::Error;

/// Errors that can occur while talking to the persistent store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The store could not be reached.
    #[error("Store connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Query error: {0}")]
    Query(String),

    /// Record not found.
    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Constraint violation (e.g., unique slug).
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = DbError::NotFound {
            entity: "Company".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Record not found: Company with id abc");
    }

    #[test]
    fn test_from_serde_error() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: DbError = parse.unwrap_err().into();
        assert!(matches!(err, DbError::Serialization(_)));
    }
}
