//! Error types for remdb-replication

use thiserror::Error;

/// Errors that can occur on a replication stream
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Socket-level failure
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Peer closed the stream mid-conversation
    #[error("stream closed by peer")]
    StreamClosed,

    /// A frame failed to decode
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame exceeded the size bound
    #[error("frame of {0} bytes exceeds the maximum")]
    FrameTooLarge(usize),

    /// The peer violated the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local database failure while applying or reading WAL
    #[error("database error: {0}")]
    Database(#[from] remdb_core::DbError),

    /// The leader reported a non-retryable error
    #[error("leader error {code}: {message}")]
    Remote { code: String, message: String },
}

impl From<rmp_serde::encode::Error> for ReplicationError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ReplicationError::Decode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ReplicationError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ReplicationError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
