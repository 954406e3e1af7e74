//! OpenAI-compatible embedding provider.
//!
//! Works against any `/embeddings` endpoint speaking the OpenAI shape
//! (OpenAI, Azure OpenAI, Ollama, local inference servers). Synchronous by
//! design: the core engine calls embedders from request threads and from
//! its background worker, never from an async runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use remdb_core::Embedder;

use crate::error::{EmbedError, Result};

/// Settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Declared output dimension.
    pub dimensions: usize,
    /// Bearer token; empty means unauthenticated (local servers).
    pub api_key: String,
    /// Retry attempts with exponential backoff.
    pub retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            api_key: String::new(),
            retries: 3,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Blocking OpenAI-compatible embedder.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    config: OpenAiConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(EmbedError::InvalidConfig("url is required".into()));
        }
        if config.model.is_empty() {
            return Err(EmbedError::InvalidConfig("model is required".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client, config })
    }

    fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: text,
            // Standard model sizes are implied; anything else is explicit.
            dimensions: match self.config.dimensions {
                1536 | 3072 => None,
                dims => Some(dims),
            },
        };

        let url = format!("{}/embeddings", self.config.url.trim_end_matches('/'));
        let mut attempt = 0u32;
        loop {
            let mut request = self.client.post(&url).json(&body);
            if !self.config.api_key.is_empty() {
                request = request.bearer_auth(&self.config.api_key);
            }
            let outcome = request.send();

            let retryable = match outcome {
                Ok(response) if response.status().is_success() => {
                    let decoded: EmbeddingResponse = response.json()?;
                    let vector = decoded
                        .data
                        .into_iter()
                        .next()
                        .map(|d| d.embedding)
                        .ok_or_else(|| {
                            EmbedError::MalformedResponse("empty data array".into())
                        })?;
                    if vector.len() != self.config.dimensions {
                        return Err(EmbedError::MalformedResponse(format!(
                            "expected {} dimensions, got {}",
                            self.config.dimensions,
                            vector.len()
                        )));
                    }
                    return Ok(vector);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().unwrap_or_default();
                    EmbedError::Endpoint { status, body }
                }
                Err(err) => EmbedError::Request(err),
            };

            attempt += 1;
            if attempt >= self.config.retries.max(1) {
                return Err(retryable);
            }
            let delay = Duration::from_millis(200 * (1 << attempt.min(5)));
            debug!(attempt, ?delay, "retrying embedding request");
            std::thread::sleep(delay);
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> remdb_core::Result<Vec<f32>> {
        debug!(model = %self.config.model, chars = text.len(), "embedding text");
        self.request(text).map_err(Into::into)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_configuration() {
        let err = OpenAiEmbedder::new(OpenAiConfig {
            url: String::new(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, EmbedError::InvalidConfig(_)));
    }

    #[test]
    fn declares_configured_dimension() {
        let embedder = OpenAiEmbedder::new(OpenAiConfig {
            dimensions: 768,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(embedder.dimensions(), 768);
    }
}
