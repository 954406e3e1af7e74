//! Error types for remdb-core

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in remdb-core operations
#[derive(Error, Debug)]
pub enum DbError {
    /// Storage-layer failure (rocksdb)
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Filesystem failure outside the KV store (snapshots, directories)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WAL is unreadable or has a sequence gap; fatal at open
    #[error("corrupt WAL: {reason}")]
    CorruptWal { reason: String },

    /// Schema rejected a payload
    #[error("validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Reference to a schema that is not registered
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// Reference to an entity that does not exist
    #[error("unknown entity: {0}")]
    UnknownEntity(Uuid),

    /// Reference to a field the schema does not declare
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Re-registration of a schema name with an incompatible definition
    #[error("schema '{0}' already registered with an incompatible definition")]
    DuplicateSchema(String),

    /// A schema definition that cannot be registered at all
    #[error("invalid schema '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    /// Vector dimension does not match the index dimension
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimMismatch { expected: usize, actual: usize },

    /// Similarity predicate on a field that carries no vectors
    #[error("field '{0}' does not support similarity search")]
    UnknownSimilarityField(String),

    /// SQL parser failure, with byte position for diagnostics
    #[error("parse error at position {position}: expected {expected}")]
    Parse { position: usize, expected: String },

    /// Embedding provider failure
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Record (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Shorthand for a validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a corrupt-WAL failure.
    pub fn corrupt_wal(reason: impl Into<String>) -> Self {
        Self::CorruptWal {
            reason: reason.into(),
        }
    }
}

impl From<rmp_serde::encode::Error> for DbError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        DbError::corrupt_wal(format!("encode: {err}"))
    }
}

impl From<rmp_serde::decode::Error> for DbError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        DbError::corrupt_wal(format!("decode: {err}"))
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_field_and_reason() {
        let err = DbError::validation("email", "expected string");
        assert_eq!(
            err.to_string(),
            "validation failed for field 'email': expected string"
        );
    }

    #[test]
    fn parse_error_reports_position() {
        let err = DbError::Parse {
            position: 17,
            expected: "FROM".into(),
        };
        assert!(err.to_string().contains("position 17"));
        assert!(err.to_string().contains("FROM"));
    }
}
