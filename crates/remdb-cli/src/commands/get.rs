//! `rem get` - fetch one entity by id.

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Entity id
    pub id: Uuid,

    /// Include the entity's outgoing edges
    #[arg(long)]
    pub edges: bool,
}

pub fn run(global: &GlobalOptions, args: GetArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let Some(entity) = db.get(args.id)? else {
        anyhow::bail!("no entity with id {}", args.id);
    };
    if args.edges {
        let edges = db.get_edges(args.id, remdb_core::Direction::Outgoing)?;
        return super::print_json(&serde_json::json!({
            "entity": entity,
            "edges": edges,
        }));
    }
    super::print_json(&entity)
}
