//! `rem query` - execute a SQL SELECT statement.

use anyhow::Result;
use clap::Args;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQL SELECT statement
    pub sql: String,
}

pub fn run(global: &GlobalOptions, args: QueryArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;
    let rows = db.sql(&args.sql)?;
    super::print_json(&rows)
}
