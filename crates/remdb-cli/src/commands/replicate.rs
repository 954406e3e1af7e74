//! `rem replicate` - follow a leader and apply its WAL locally.

use anyhow::Result;
use clap::Args;
use tokio::sync::watch;
use tracing::info;

use remdb_replication::Follower;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct ReplicateArgs {
    /// Leader address (host:port); defaults to replication.peer_addr
    #[arg(long)]
    pub peer: Option<String>,

    /// The leader's peer id (keys the resumption watermark)
    #[arg(long)]
    pub peer_id: String,
}

pub async fn run(global: &GlobalOptions, args: ReplicateArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let leader_addr = args
        .peer
        .unwrap_or_else(|| config.replication.peer_addr.clone());
    if leader_addr.is_empty() {
        anyhow::bail!("no leader address: pass --peer or set replication.peer_addr");
    }

    let follower = Follower::new(
        db,
        config.replication.peer_id.clone(),
        leader_addr,
        args.peer_id,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    follower.run(shutdown_rx).await?;
    Ok(())
}
