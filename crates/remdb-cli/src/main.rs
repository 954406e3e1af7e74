//! rem - REM-DB command line interface
//!
//! A thin wrapper over the library surface: every subcommand maps onto one
//! database operation, prints JSON on stdout, and exits nonzero on any
//! surfaced error.
//!
//! # Usage
//!
//! ```bash
//! # Initialize a database directory
//! rem init
//!
//! # Register a schema and insert a row
//! rem schema add person --file person.json
//! rem insert person '{"name": "Alice", "role": "engineer"}'
//!
//! # Query
//! rem query "SELECT name FROM person WHERE role = 'engineer' LIMIT 5"
//! rem search "distributed systems notes"
//!
//! # Replicate
//! rem serve --listen 0.0.0.0:9901
//! rem replicate --peer leader.example:9901 --peer-id leader-a
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// REM-DB - embedded multi-tenant knowledge store
#[derive(Parser, Debug)]
#[command(name = "rem")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Database directory
    #[arg(long, global = true, env = "P8_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Tenant to operate on
    #[arg(long, short = 't', global = true, env = "P8_TENANT_ID")]
    tenant: Option<String>,

    /// Embedding provider override (hashed, openai)
    #[arg(long, global = true)]
    embedding_provider: Option<String>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    fn to_overrides(&self) -> remdb_config::ConfigOverrides {
        remdb_config::ConfigOverrides {
            db_path: self.db_path.clone(),
            tenant: self.tenant.clone(),
            embedding_provider: self.embedding_provider.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a database directory and local config
    Init(commands::init::InitArgs),

    /// Schema management
    #[command(subcommand)]
    Schema(commands::schema::SchemaCommand),

    /// Insert one row into a schema
    Insert(commands::insert::InsertArgs),

    /// Ingest a directory of files as resources
    Ingest(commands::ingest::IngestArgs),

    /// Fetch one entity by id
    Get(commands::get::GetArgs),

    /// Global lookup by name, alias, or identifier
    Lookup(commands::lookup::LookupArgs),

    /// Vector similarity search
    Search(commands::search::SearchArgs),

    /// Execute a SQL SELECT statement
    Query(commands::query::QueryArgs),

    /// Ask a question over one schema (similarity SELECT convenience)
    Ask(commands::ask::AskArgs),

    /// Traverse the entity graph
    Traverse(commands::traverse::TraverseArgs),

    /// Export a schema's rows as JSON lines
    Export(commands::export::ExportArgs),

    /// Serve the WAL to replication followers (leader)
    Serve(commands::serve::ServeArgs),

    /// Follow a leader and apply its WAL (follower)
    Replicate(commands::replicate::ReplicateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose {
        "debug"
    } else if cli.global.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    run_command(cli).await
}

async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init(args) => commands::init::run(&cli.global, args),
        Commands::Schema(command) => commands::schema::run(&cli.global, command),
        Commands::Insert(args) => commands::insert::run(&cli.global, args),
        Commands::Ingest(args) => commands::ingest::run(&cli.global, args),
        Commands::Get(args) => commands::get::run(&cli.global, args),
        Commands::Lookup(args) => commands::lookup::run(&cli.global, args),
        Commands::Search(args) => commands::search::run(&cli.global, args),
        Commands::Query(args) => commands::query::run(&cli.global, args),
        Commands::Ask(args) => commands::ask::run(&cli.global, args),
        Commands::Traverse(args) => commands::traverse::run(&cli.global, args),
        Commands::Export(args) => commands::export::run(&cli.global, args),
        Commands::Serve(args) => commands::serve::run(&cli.global, args).await,
        Commands::Replicate(args) => commands::replicate::run(&cli.global, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_query_invocation() {
        let cli = Cli::parse_from([
            "rem",
            "--tenant",
            "acme",
            "query",
            "SELECT * FROM person LIMIT 1",
        ]);
        assert_eq!(cli.global.tenant.as_deref(), Some("acme"));
        assert!(matches!(cli.command, Commands::Query(_)));
    }
}
