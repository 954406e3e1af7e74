//! Follower side: subscribes to a leader's WAL stream and applies entries.
//!
//! State machine per stream: `Idle → Subscribing → Catchup → Live →
//! Disconnected → Idle`. Reconnects resume from the persisted watermark
//! with exponential backoff; entries at or below the watermark are refused
//! by the database, so replays after a crash are harmless.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use remdb_core::Database;

use crate::error::{ReplicationError, Result};
use crate::protocol::{read_message, write_message, Request, Response};

/// Backoff bounds for reconnection.
const BACKOFF_INITIAL: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Follower stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    Idle,
    Subscribing,
    Catchup,
    Live,
    Disconnected,
}

/// Replication follower for one upstream leader.
pub struct Follower {
    db: Arc<Database>,
    /// This node's peer id, sent with `Subscribe`.
    peer_id: String,
    /// Leader address, `host:port`.
    leader_addr: String,
    /// The leader's peer id; keys the resumption watermark.
    leader_peer_id: String,
    state: Arc<Mutex<FollowerState>>,
}

impl Follower {
    pub fn new(
        db: Arc<Database>,
        peer_id: impl Into<String>,
        leader_addr: impl Into<String>,
        leader_peer_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            peer_id: peer_id.into(),
            leader_addr: leader_addr.into(),
            leader_peer_id: leader_peer_id.into(),
            state: Arc::new(Mutex::new(FollowerState::Idle)),
        }
    }

    pub fn state(&self) -> FollowerState {
        *self.state.lock()
    }

    fn set_state(&self, state: FollowerState) {
        *self.state.lock() = state;
    }

    /// Run until `shutdown` flips to true, reconnecting on stream loss.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut backoff = BACKOFF_INITIAL;
        loop {
            if *shutdown.borrow() {
                self.set_state(FollowerState::Idle);
                return Ok(());
            }

            match self.stream_once(&mut shutdown).await {
                Ok(()) => {
                    // Clean shutdown requested mid-stream.
                    self.set_state(FollowerState::Idle);
                    return Ok(());
                }
                Err(ReplicationError::Remote { code, message }) => {
                    self.set_state(FollowerState::Idle);
                    return Err(ReplicationError::Remote { code, message });
                }
                Err(err) => {
                    self.set_state(FollowerState::Disconnected);
                    warn!(leader = %self.leader_addr, "stream lost: {err}; retrying in {backoff:?}");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.set_state(FollowerState::Idle);
                        return Ok(());
                    }
                }
            }
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }

    /// One subscribe/catchup/live cycle. Returns `Ok` only on requested
    /// shutdown; any stream end is an error that triggers reconnect.
    async fn stream_once(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        self.set_state(FollowerState::Subscribing);
        let stream = TcpStream::connect(&self.leader_addr).await?;
        let (mut reader, mut writer) = stream.into_split();

        let watermark = self.db.follower_watermark(&self.leader_peer_id)?;
        write_message(
            &mut writer,
            &Request::Subscribe {
                peer_id: self.peer_id.clone(),
                tenant: self.db.tenant().to_string(),
                watermark,
            },
        )
        .await?;
        debug!(watermark, leader = %self.leader_addr, "subscribe sent");

        self.set_state(FollowerState::Catchup);
        let mut applied = watermark;
        loop {
            let message = tokio::select! {
                message = read_message::<_, Response>(&mut reader) => message?,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            };
            let Some(message) = message else {
                return Err(ReplicationError::StreamClosed);
            };

            match message {
                Response::Connected {
                    current_seq,
                    server_peer_id,
                } => {
                    if server_peer_id != self.leader_peer_id {
                        // Entries are keyed by their stamped source peer, so
                        // apply stays idempotent; resumption just restarts
                        // from zero until the configuration is fixed.
                        warn!(
                            expected = %self.leader_peer_id,
                            actual = %server_peer_id,
                            "leader peer id differs from configuration"
                        );
                    }
                    info!(current_seq, "connected to leader");
                    if current_seq <= applied {
                        self.set_state(FollowerState::Live);
                    }
                }
                Response::HistoricalBatch { entries } => {
                    for entry in entries {
                        if self.db.apply_replicated(&entry)? {
                            applied = entry.seq;
                        }
                    }
                    write_message(&mut writer, &Request::Ack { seq: applied }).await?;
                }
                Response::Entry { entry } => {
                    // First live entry marks the end of catch-up.
                    self.set_state(FollowerState::Live);
                    if self.db.apply_replicated(&entry)? {
                        applied = entry.seq;
                    }
                    write_message(&mut writer, &Request::Ack { seq: applied }).await?;
                }
                Response::Error {
                    code,
                    message,
                    retryable,
                } => {
                    if retryable {
                        return Err(ReplicationError::Protocol(format!("{code}: {message}")));
                    }
                    return Err(ReplicationError::Remote { code, message });
                }
            }
        }
    }
}
