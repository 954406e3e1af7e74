//! `rem search` - vector similarity search over all embedded rows.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text (embedded with the configured provider)
    pub query: String,

    /// Maximum results
    #[arg(long, short = 'k', default_value_t = 10)]
    pub top_k: usize,

    /// Minimum similarity score
    #[arg(long, default_value_t = 0.0)]
    pub min_score: f32,
}

pub fn run(global: &GlobalOptions, args: SearchArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let settings = super::embedding_settings(&config)?;
    let embedder = remdb_embed::create(&settings)?;
    let query_vector = embedder.embed(&args.query)?;

    let hits = db.search_similar(&query_vector, args.top_k, args.min_score)?;
    let rows: Vec<_> = hits
        .into_iter()
        .map(|(entity, score)| {
            json!({
                "id": entity.id,
                "schema": entity.schema,
                "name": entity.name,
                "_score": score,
            })
        })
        .collect();
    super::print_json(&rows)
}
