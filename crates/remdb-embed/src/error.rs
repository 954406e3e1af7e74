//! Error types for remdb-embed

use thiserror::Error;

/// Errors that can occur while building or calling embedding providers
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Provider configuration is incomplete or contradictory
    #[error("invalid embedding configuration: {0}")]
    InvalidConfig(String),

    /// The configured API key environment variable is missing
    #[error("api key environment variable '{0}' is not set")]
    MissingApiKey(String),

    /// HTTP transport failure
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Remote endpoint answered with a non-success status
    #[error("embedding endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    /// Response decoded but carried no usable vector
    #[error("embedding response was malformed: {0}")]
    MalformedResponse(String),
}

impl From<EmbedError> for remdb_core::DbError {
    fn from(err: EmbedError) -> Self {
        remdb_core::DbError::Embedding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
