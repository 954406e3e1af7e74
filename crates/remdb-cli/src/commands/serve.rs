//! `rem serve` - run the replication leader.

use anyhow::Result;
use clap::Args;
use tokio::sync::watch;
use tracing::info;

use remdb_replication::ReplicationServer;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address; defaults to replication.listen_addr from config
    #[arg(long)]
    pub listen: Option<String>,
}

pub async fn run(global: &GlobalOptions, args: ServeArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let addr = args
        .listen
        .unwrap_or_else(|| config.replication.listen_addr.clone());
    let server = ReplicationServer::new(db, config.replication.peer_id.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server.serve(&addr, shutdown_rx).await?;
    Ok(())
}
