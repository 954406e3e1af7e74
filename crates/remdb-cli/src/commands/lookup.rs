//! `rem lookup` - global lookup by name, alias, or identifier.

use anyhow::Result;
use clap::Args;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Name, alias, id, or id-like property value
    pub identifier: String,
}

pub fn run(global: &GlobalOptions, args: LookupArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;
    let matches = db.lookup(&args.identifier)?;
    super::print_json(&matches)
}
