//! Provider construction from settings.

use std::sync::Arc;

use remdb_core::Embedder;

use crate::error::{EmbedError, Result};
use crate::hashed::HashedEmbedder;
use crate::openai::{OpenAiConfig, OpenAiEmbedder};

/// Which provider to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Deterministic offline hashing (no network, no model).
    #[default]
    Hashed,
    /// OpenAI-compatible HTTP endpoint.
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hashed" | "offline" => Ok(ProviderKind::Hashed),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(EmbedError::InvalidConfig(format!(
                "unknown embedding provider '{other}'"
            ))),
        }
    }
}

/// Settings resolved by the configuration layer.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    pub dimensions: usize,
    pub openai: Option<OpenAiConfig>,
}

/// Build a shareable embedder from settings.
pub fn create(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let dimensions = if settings.dimensions == 0 {
        384
    } else {
        settings.dimensions
    };
    match settings.provider {
        ProviderKind::Hashed => Ok(Arc::new(HashedEmbedder::new(dimensions))),
        ProviderKind::OpenAi => {
            let mut config = settings.openai.clone().ok_or_else(|| {
                EmbedError::InvalidConfig(
                    "provider is 'openai' but no openai settings were given".into(),
                )
            })?;
            config.dimensions = dimensions;
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
    }
}
