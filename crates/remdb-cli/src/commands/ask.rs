//! `rem ask` - similarity SELECT convenience over one schema.

use anyhow::Result;
use clap::Args;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Question text
    pub question: String,

    /// Schema to search
    #[arg(long, default_value = "resource")]
    pub table: String,

    /// Maximum results
    #[arg(long, short = 'k', default_value_t = 5)]
    pub top_k: usize,
}

pub fn run(global: &GlobalOptions, args: AskArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    // Quotes in the question would break the statement; strip them.
    let question = args.question.replace(['"', '\''], " ");
    let sql = format!(
        "SELECT * FROM {} WHERE embedding.cosine(\"{}\") LIMIT {}",
        args.table, question, args.top_k
    );
    let rows = db.sql(&sql)?;
    super::print_json(&rows)
}
