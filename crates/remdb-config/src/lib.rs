//! REM-DB configuration management.
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.remdb/config.toml`
//! - Local config: `.remdb/config.toml` (in the working directory)
//! - Environment: `P8_DB_PATH`, `P8_TENANT_ID`
//! - CLI overrides via [`ConfigOverrides`]
//!
//! Configuration merges in order: global → local → environment → overrides.
//! Only the two `P8_*` variables influence core behavior; everything else
//! is CLI-layer convenience.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the database directory.
pub const ENV_DB_PATH: &str = "P8_DB_PATH";
/// Environment variable naming the default tenant.
pub const ENV_TENANT_ID: &str = "P8_TENANT_ID";

/// Root configuration, fully merged from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RemConfig {
    /// Storage location and tenant
    pub storage: StorageConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Replication endpoints
    pub replication: ReplicationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RemConfig {
    /// Validate that the merged configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.tenant.is_empty() {
            return Err(ConfigError::Validation(
                "storage.tenant must not be empty".into(),
            ));
        }
        self.embedding.validate()
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database directory (one directory per database).
    pub path: PathBuf,
    /// Tenant served by default.
    pub tenant: String,
    /// Vector dimension fixed at open.
    pub embedding_dim: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./remdb-data"),
            tenant: "default".to_string(),
            embedding_dim: 384,
        }
    }
}

/// Embedding provider configuration.
///
/// # Example TOML
///
/// ```toml
/// [embedding]
/// provider = "openai"   # or "hashed"
///
/// [embedding.openai]
/// url = "https://api.openai.com/v1"
/// api_key_env = "OPENAI_API_KEY"
/// model = "text-embedding-3-small"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use: `hashed` (offline, default) or `openai`.
    pub provider: String,

    /// OpenAI-compatible settings (required when provider = "openai").
    pub openai: Option<OpenAiSettings>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashed".to_string(),
            openai: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider.as_str() {
            "hashed" | "offline" => Ok(()),
            "openai" => {
                let settings = self.openai.as_ref().ok_or_else(|| {
                    ConfigError::Validation(
                        "embedding.provider is 'openai' but [embedding.openai] is missing"
                            .into(),
                    )
                })?;
                if settings.url.is_empty() {
                    return Err(ConfigError::Validation(
                        "embedding.openai.url is required".into(),
                    ));
                }
                if settings.model.is_empty() {
                    return Err(ConfigError::Validation(
                        "embedding.openai.model is required".into(),
                    ));
                }
                Ok(())
            }
            other => Err(ConfigError::Validation(format!(
                "unknown embedding provider '{other}'"
            ))),
        }
    }
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub url: String,
    /// Name of the environment variable holding the API key. The key value
    /// itself never lives in a config file.
    pub api_key_env: String,
    pub model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Replication configuration (leader `serve` / follower `replicate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// This node's peer id.
    pub peer_id: String,
    /// Leader bind address for `serve`.
    pub listen_addr: String,
    /// Upstream leader address for `replicate`.
    pub peer_addr: String,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            peer_id: "node-a".to_string(),
            listen_addr: "127.0.0.1:9901".to_string(),
            peer_addr: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `remdb_core=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CLI-level overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub tenant: Option<String>,
    pub embedding_provider: Option<String>,
}
