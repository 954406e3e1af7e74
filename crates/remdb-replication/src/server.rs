//! Leader side: serves WAL history plus a live tail to subscribed peers.
//!
//! Per connection: read `Subscribe`, answer `Connected`, stream
//! `HistoricalBatch` messages covering `(watermark, current_seq]`, then poll
//! the WAL for new entries and stream them as `Entry` messages. A separate
//! task consumes `Ack`s and keeps the per-peer watermark for observability
//! and flow control.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use remdb_core::Database;

use crate::error::{ReplicationError, Result};
use crate::protocol::{read_message, write_message, Request, Response, HISTORICAL_BATCH_SIZE};

/// Interval between WAL polls once a stream is live.
const LIVE_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Replication leader.
pub struct ReplicationServer {
    db: Arc<Database>,
    peer_id: String,
    // Never held across an await point.
    watermarks: Arc<Mutex<HashMap<String, u64>>>,
}

impl ReplicationServer {
    pub fn new(db: Arc<Database>, peer_id: impl Into<String>) -> Self {
        Self {
            db,
            peer_id: peer_id.into(),
            watermarks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Last acknowledged sequence per connected peer.
    pub fn peer_watermarks(&self) -> HashMap<String, u64> {
        self.watermarks.lock().clone()
    }

    /// Bind and serve until `shutdown` flips to true.
    pub async fn serve(&self, addr: &str, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr, peer_id = %self.peer_id, "replication leader listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = accepted?;
                    debug!(%remote, "follower connected");
                    let db = self.db.clone();
                    let peer_id = self.peer_id.clone();
                    let watermarks = self.watermarks.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) =
                            handle_connection(db, peer_id, watermarks, stream, shutdown).await
                        {
                            warn!(%remote, "replication stream ended: {err}");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("replication leader stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    db: Arc<Database>,
    server_peer_id: String,
    watermarks: Arc<Mutex<HashMap<String, u64>>>,
    stream: TcpStream,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let subscribe = match read_message::<_, Request>(&mut reader).await? {
        Some(Request::Subscribe {
            peer_id,
            tenant,
            watermark,
        }) => (peer_id, tenant, watermark),
        Some(other) => {
            let response = Response::Error {
                code: "EXPECTED_SUBSCRIBE".into(),
                message: format!("first message must be Subscribe, got {other:?}"),
                retryable: false,
            };
            write_message(&mut writer, &response).await?;
            return Err(ReplicationError::Protocol("missing subscribe".into()));
        }
        None => return Err(ReplicationError::StreamClosed),
    };
    let (follower_id, tenant, watermark) = subscribe;

    if tenant != db.tenant() {
        let response = Response::Error {
            code: "UNKNOWN_TENANT".into(),
            message: format!("leader serves tenant '{}', not '{tenant}'", db.tenant()),
            retryable: false,
        };
        write_message(&mut writer, &response).await?;
        return Err(ReplicationError::Protocol("tenant mismatch".into()));
    }

    let current_seq = db.current_seq();
    info!(
        follower = %follower_id,
        watermark,
        current_seq,
        "subscription accepted"
    );
    watermarks.lock().insert(follower_id.clone(), watermark);
    write_message(
        &mut writer,
        &Response::Connected {
            current_seq,
            server_peer_id: server_peer_id.clone(),
        },
    )
    .await?;

    // Acks arrive concurrently with the outgoing stream; a dedicated task
    // drains them so frame reads are never torn by select cancellation.
    let ack_follower = follower_id.clone();
    let ack_watermarks = watermarks.clone();
    let (closed_tx, mut closed_rx) = watch::channel(false);
    tokio::spawn(async move {
        read_acks(reader, ack_follower, ack_watermarks).await;
        let _ = closed_tx.send(true);
    });

    // Historical catch-up: (watermark, current_seq] in bounded batches.
    let mut sent_seq = watermark;
    while sent_seq < current_seq {
        let entries = db.wal_range(sent_seq, Some(current_seq), HISTORICAL_BATCH_SIZE)?;
        if entries.is_empty() {
            break;
        }
        sent_seq = entries.last().map(|e| e.seq).unwrap_or(sent_seq);
        write_message(&mut writer, &Response::HistoricalBatch { entries }).await?;
    }
    debug!(follower = %follower_id, sent_seq, "catch-up complete, switching to live");

    // Live tail: poll for entries past what this stream has sent.
    let mut interval = tokio::time::interval(LIVE_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                loop {
                    let entries = db.wal_range(sent_seq, None, HISTORICAL_BATCH_SIZE)?;
                    if entries.is_empty() {
                        break;
                    }
                    for entry in entries {
                        sent_seq = entry.seq;
                        write_message(&mut writer, &Response::Entry { entry }).await?;
                    }
                }
            }
            _ = closed_rx.changed() => {
                if *closed_rx.borrow() {
                    watermarks.lock().remove(&follower_id);
                    return Err(ReplicationError::StreamClosed);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

async fn read_acks(
    mut reader: OwnedReadHalf,
    follower_id: String,
    watermarks: Arc<Mutex<HashMap<String, u64>>>,
) {
    loop {
        match read_message::<_, Request>(&mut reader).await {
            Ok(Some(Request::Ack { seq })) => {
                watermarks.lock().insert(follower_id.clone(), seq);
            }
            Ok(Some(other)) => {
                warn!(follower = %follower_id, "unexpected message on ack stream: {other:?}");
            }
            Ok(None) | Err(_) => {
                debug!(follower = %follower_id, "ack stream closed");
                return;
            }
        }
    }
}
