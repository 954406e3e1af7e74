//! `rem insert` - insert one row.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct InsertArgs {
    /// Target schema
    pub schema: String,

    /// Inline JSON payload
    pub payload: Option<String>,

    /// Read the payload from a file instead
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Wait for background work (embedding generation) before exiting
    #[arg(long)]
    pub wait: bool,
}

pub fn run(global: &GlobalOptions, args: InsertArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let text = match (&args.payload, &args.file) {
        (Some(inline), None) => inline.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => bail!("provide the payload inline or via --file, not both"),
    };
    let payload: serde_json::Value =
        serde_json::from_str(&text).context("payload is not valid JSON")?;

    let id = db.insert(&args.schema, payload)?;
    if args.wait {
        db.wait_for_worker(std::time::Duration::from_secs(30));
    }
    super::print_json(&serde_json::json!({ "id": id }))
}
