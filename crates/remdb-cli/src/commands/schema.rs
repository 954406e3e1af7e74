//! `rem schema` - register, list, and inspect schemas.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use crate::GlobalOptions;

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Register a schema from a JSON definition
    Add(AddArgs),
    /// List registered schemas
    List(ListArgs),
    /// Show one schema definition
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Schema name
    pub name: String,

    /// Inline JSON definition
    pub definition: Option<String>,

    /// Read the definition from a file instead
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Restrict to one category (system, agents, public, user)
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Schema name
    pub name: String,
}

pub fn run(global: &GlobalOptions, command: SchemaCommand) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    match command {
        SchemaCommand::Add(args) => {
            let text = match (&args.definition, &args.file) {
                (Some(inline), None) => inline.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                _ => bail!("provide the definition inline or via --file, not both"),
            };
            let definition: serde_json::Value =
                serde_json::from_str(&text).context("definition is not valid JSON")?;
            let schema = db.register_schema(&args.name, definition)?;
            super::print_json(schema.as_ref())
        }
        SchemaCommand::List(args) => {
            let names = match &args.category {
                Some(category) => db.list_schemas_by_category(category),
                None => db.list_schemas(),
            };
            super::print_json(&names)
        }
        SchemaCommand::Show(args) => {
            let schema = db
                .get_schema(&args.name)
                .ok_or_else(|| anyhow::anyhow!("schema '{}' is not registered", args.name))?;
            super::print_json(schema.as_ref())
        }
    }
}
