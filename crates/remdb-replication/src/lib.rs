//! Leader/follower WAL shipping for REM-DB.
//!
//! The leader serves each follower its missing WAL range in bounded
//! `HistoricalBatch` messages and then streams new entries live; followers
//! apply entries idempotently against their persisted watermark. Framing is
//! length-prefixed MessagePack over TCP, preserving `key_bytes` and
//! `value_bytes` verbatim so apply is a byte-for-byte KV replay.

mod client;
mod error;
pub mod protocol;
mod server;

pub use client::{Follower, FollowerState};
pub use error::ReplicationError;
pub use server::ReplicationServer;
