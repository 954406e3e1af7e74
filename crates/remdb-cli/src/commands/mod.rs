//! CLI command implementations.

pub mod ask;
pub mod export;
pub mod get;
pub mod ingest;
pub mod init;
pub mod insert;
pub mod lookup;
pub mod query;
pub mod replicate;
pub mod schema;
pub mod search;
pub mod serve;
pub mod traverse;

use std::sync::Arc;

use anyhow::{Context, Result};

use remdb_config::{ConfigLoader, RemConfig};
use remdb_core::{Database, DatabaseOptions};
use remdb_embed::{EmbeddingSettings, OpenAiConfig, ProviderKind};

use crate::GlobalOptions;

/// Load the merged configuration for the current working directory.
pub fn load_config(global: &GlobalOptions) -> Result<RemConfig> {
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    ConfigLoader::new()
        .load(&cwd, &global.to_overrides())
        .context("failed to load configuration")
}

/// Open the configured database and bind the configured embedder.
pub fn open_database(config: &RemConfig) -> Result<Arc<Database>> {
    let db = Database::open_with_options(
        &config.storage.path,
        &config.storage.tenant,
        DatabaseOptions {
            embedding_dim: config.storage.embedding_dim,
            peer_id: config.replication.peer_id.clone(),
            ..Default::default()
        },
    )
    .with_context(|| {
        format!(
            "failed to open database at {}",
            config.storage.path.display()
        )
    })?;

    let embedder = remdb_embed::create(&embedding_settings(config)?)
        .context("failed to build embedding provider")?;
    db.set_embedder(embedder);
    Ok(Arc::new(db))
}

pub fn embedding_settings(config: &RemConfig) -> Result<EmbeddingSettings> {
    let provider: ProviderKind = config
        .embedding
        .provider
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let openai = match (&provider, &config.embedding.openai) {
        (ProviderKind::OpenAi, Some(settings)) => {
            let api_key = std::env::var(&settings.api_key_env).unwrap_or_default();
            Some(OpenAiConfig {
                url: settings.url.clone(),
                model: settings.model.clone(),
                dimensions: config.storage.embedding_dim,
                api_key,
                retries: 3,
            })
        }
        _ => None,
    };
    Ok(EmbeddingSettings {
        provider,
        dimensions: config.storage.embedding_dim,
        openai,
    })
}

/// Print a serializable value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
