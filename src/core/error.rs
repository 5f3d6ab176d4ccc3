//! Store errors
//!
//! Only hard failures live here. Degraded external calls (embedding,
//! extraction, conflict judgment) are absorbed where they happen and never
//! show up as a `StoreError`.

use thiserror::Error;

/// Errors surfaced by the fact store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Addressed a fact, decision or pending key that does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Malformed input, rejected before any mutation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage engine failure (connectivity, constraints)
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON column could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Supersession target was retired by someone else first
    #[error("fact {0} was already retired")]
    AlreadyRetired(String),

    /// Connection mutex poisoned by a panicking writer
    #[error("lock error: {0}")]
    Lock(String),
}

impl StoreError {
    pub fn fact_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            kind: "fact",
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_retired(&self) -> bool {
        matches!(self, StoreError::AlreadyRetired(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = StoreError::fact_not_found("01ABC");
        assert_eq!(err.to_string(), "fact not found: 01ABC");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_validation_is_not_not_found() {
        let err = StoreError::validation("content must not be empty");
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("content must not be empty"));
    }
}
