//! Embedding providers for REM-DB.
//!
//! The core engine defines the [`Embedder`] seam and never selects a model;
//! this crate supplies the implementations a host can bind:
//!
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`HashedEmbedder`]: deterministic offline feature hashing
//!
//! [`factory::create`] builds a provider from resolved settings.

mod error;
pub mod factory;
mod hashed;
mod openai;

pub use error::EmbedError;
pub use factory::{create, EmbeddingSettings, ProviderKind};
pub use hashed::HashedEmbedder;
pub use openai::{OpenAiConfig, OpenAiEmbedder};
pub use remdb_core::Embedder;
