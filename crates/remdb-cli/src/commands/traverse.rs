//! `rem traverse` - bounded graph traversal from one entity.

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use remdb_core::{TraversalStrategy, TraverseOptions};

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct TraverseArgs {
    /// Starting entity id
    pub start: Uuid,

    /// Traversal strategy
    #[arg(long, default_value = "bfs", value_parser = parse_strategy)]
    pub strategy: TraversalStrategy,

    /// Maximum depth (edges per path)
    #[arg(long, default_value_t = 3)]
    pub max_depth: usize,

    /// Follow only these relation types (repeatable)
    #[arg(long = "rel")]
    pub rel_filter: Vec<String>,

    /// Stop at this entity
    #[arg(long)]
    pub target: Option<Uuid>,
}

fn parse_strategy(s: &str) -> Result<TraversalStrategy, String> {
    match s.to_ascii_lowercase().as_str() {
        "bfs" => Ok(TraversalStrategy::Bfs),
        "dfs" => Ok(TraversalStrategy::Dfs),
        other => Err(format!("unknown strategy '{other}' (expected bfs or dfs)")),
    }
}

pub fn run(global: &GlobalOptions, args: TraverseArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let paths = db.traverse(
        args.start,
        TraverseOptions {
            strategy: Some(args.strategy),
            max_depth: Some(args.max_depth),
            rel_filter: if args.rel_filter.is_empty() {
                None
            } else {
                Some(args.rel_filter.clone())
            },
            target: args.target,
        },
    )?;
    super::print_json(&paths)
}
