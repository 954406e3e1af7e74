//! Wire protocol: framed MessagePack messages.
//!
//! Frames are a 4-byte big-endian length followed by an rmp-serde payload.
//! MessagePack keeps `key_bytes`/`value_bytes` verbatim, so follower apply
//! is a byte-for-byte KV replay.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use remdb_core::WalEntry;

use crate::error::{ReplicationError, Result};

/// Upper bound on a single frame; a historical batch of 100 entries stays
/// far below this.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Entries per `HistoricalBatch`.
pub const HISTORICAL_BATCH_SIZE: usize = 100;

/// Follower → leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Request {
    Subscribe {
        peer_id: String,
        tenant: String,
        watermark: u64,
    },
    Ack {
        seq: u64,
    },
}

/// Leader → follower.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Response {
    Connected {
        current_seq: u64,
        server_peer_id: String,
    },
    HistoricalBatch {
        entries: Vec<WalEntry>,
    },
    Entry {
        entry: WalEntry,
    },
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

/// Write one framed message.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = rmp_serde::to_vec(message)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ReplicationError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message; `None` on a clean end of stream.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ReplicationError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(rmp_serde::from_slice(&payload)?))
}
