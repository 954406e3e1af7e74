//! `rem init` - create the database directory and a local config file.

use anyhow::Result;
use clap::Args;
use tracing::info;

use remdb_config::ConfigLoader;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing local config file
    #[arg(long)]
    pub force: bool,
}

pub fn run(global: &GlobalOptions, args: InitArgs) -> Result<()> {
    let config = super::load_config(global)?;

    // Opening registers the built-in schemas and lays out the directory.
    let db = super::open_database(&config)?;
    info!(
        path = %config.storage.path.display(),
        tenant = %config.storage.tenant,
        schemas = db.list_schemas().len(),
        "database initialized"
    );

    let loader = ConfigLoader::new();
    let cwd = std::env::current_dir()?;
    let local_path = loader.local_config_path(&cwd);
    if !local_path.exists() || args.force {
        loader.write(&local_path, &config)?;
        info!(path = %local_path.display(), "wrote local config");
    }

    super::print_json(&serde_json::json!({
        "path": config.storage.path,
        "tenant": config.storage.tenant,
        "schemas": db.list_schemas(),
    }))
}
