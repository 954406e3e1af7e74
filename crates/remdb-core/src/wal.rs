//! Write-ahead log: monotonic per-tenant sequence, durable append, bounded
//! in-memory tail for follower catch-up.
//!
//! Every KV put/delete of a logical mutation gets its own sequence number
//! and WAL record, committed in the same atomic batch as the data write.
//! The sequence lock is held across allocation and commit, so WAL order is
//! total and matches commit order within a tenant.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;

use crate::error::{DbError, Result};
use crate::keys;
use crate::kv::{Store, WriteOp};
use crate::types::{WalEntry, WalOp};

/// Entries kept in memory for fast catch-up.
const TAIL_CAPACITY: usize = 1000;

/// Default tablespace stamped into entries (a single-column-family store).
pub const DEFAULT_TABLESPACE: &str = "default";

#[derive(Debug)]
pub struct WalStore {
    store: Store,
    tenant: String,
    source_peer: String,
    seq: Mutex<u64>,
    tail: Mutex<VecDeque<WalEntry>>,
}

impl WalStore {
    /// Rehydrate the sequence from disk and verify the recent entries are
    /// decodable and contiguous. The sequence never decreases across opens.
    pub fn open(store: Store, tenant: &str, source_peer: &str) -> Result<Self> {
        let seq = match store.get(&keys::wal_seq(tenant))? {
            Some(bytes) => {
                let v: serde_json::Value = serde_json::from_slice(&bytes)?;
                v.get("seq").and_then(|s| s.as_u64()).ok_or_else(|| {
                    DbError::corrupt_wal("sequence record is malformed")
                })?
            }
            None => 0,
        };

        // Decode the recent window both as a corruption check and to warm
        // the tail.
        let mut tail = VecDeque::with_capacity(TAIL_CAPACITY);
        let rows = store.scan_prefix(&keys::wal_entry_prefix(tenant))?;
        let recent = rows.len().saturating_sub(TAIL_CAPACITY);
        let mut previous: Option<u64> = None;
        for (key, value) in &rows[recent..] {
            let entry: WalEntry = rmp_serde::from_slice(value).map_err(|e| {
                DbError::corrupt_wal(format!(
                    "undecodable entry at {}: {e}",
                    String::from_utf8_lossy(key)
                ))
            })?;
            if let Some(prev) = previous {
                if entry.seq != prev + 1 {
                    return Err(DbError::corrupt_wal(format!(
                        "sequence gap: {prev} -> {}",
                        entry.seq
                    )));
                }
            }
            previous = Some(entry.seq);
            tail.push_back(entry);
        }
        if let Some(last) = previous {
            if last > seq {
                return Err(DbError::corrupt_wal(format!(
                    "last entry {last} is beyond the recorded sequence {seq}"
                )));
            }
        }

        Ok(Self {
            store,
            tenant: tenant.to_string(),
            source_peer: source_peer.to_string(),
            seq: Mutex::new(seq),
            tail: Mutex::new(tail),
        })
    }

    pub fn current_seq(&self) -> u64 {
        *self.seq.lock()
    }

    /// Stamp each data op with a sequence number, append the matching WAL
    /// records, and commit everything in one atomic batch.
    pub fn append_batch(&self, data_ops: Vec<WriteOp>) -> Result<Vec<WalEntry>> {
        if data_ops.is_empty() {
            return Ok(Vec::new());
        }
        let timestamp_ns = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default() as u64;

        let mut seq_guard = self.seq.lock();
        let mut seq = *seq_guard;
        let mut entries = Vec::with_capacity(data_ops.len());
        let mut batch = Vec::with_capacity(data_ops.len() * 2 + 1);

        for op in data_ops {
            seq += 1;
            let entry = match &op {
                WriteOp::Put { key, value } => WalEntry {
                    seq,
                    tenant: self.tenant.clone(),
                    tablespace: DEFAULT_TABLESPACE.to_string(),
                    op: WalOp::Put,
                    key_bytes: key.clone(),
                    value_bytes: value.clone(),
                    timestamp_ns,
                    source_peer: self.source_peer.clone(),
                },
                WriteOp::Delete { key } => WalEntry {
                    seq,
                    tenant: self.tenant.clone(),
                    tablespace: DEFAULT_TABLESPACE.to_string(),
                    op: WalOp::Delete,
                    key_bytes: key.clone(),
                    value_bytes: Vec::new(),
                    timestamp_ns,
                    source_peer: self.source_peer.clone(),
                },
            };
            batch.push(WriteOp::put(
                keys::wal_entry(&self.tenant, seq),
                rmp_serde::to_vec(&entry)?,
            ));
            batch.push(op);
            entries.push(entry);
        }
        batch.push(WriteOp::put(
            keys::wal_seq(&self.tenant),
            serde_json::to_vec(&json!({ "seq": seq }))?,
        ));

        self.store.batch(batch)?;
        *seq_guard = seq;
        drop(seq_guard);

        let mut tail = self.tail.lock();
        for entry in &entries {
            if tail.len() == TAIL_CAPACITY {
                tail.pop_front();
            }
            tail.push_back(entry.clone());
        }
        Ok(entries)
    }

    /// Ops for applying one replicated entry: the data write, the WAL record
    /// under the leader's sequence, and the sequence advance. The caller
    /// commits them with its watermark update in one batch.
    pub fn replicated_ops(&self, entry: &WalEntry) -> Result<Vec<WriteOp>> {
        let mut seq_guard = self.seq.lock();
        let mut ops = vec![
            WriteOp::put(
                keys::wal_entry(&self.tenant, entry.seq),
                rmp_serde::to_vec(entry)?,
            ),
            match entry.op {
                WalOp::Put => WriteOp::put(entry.key_bytes.clone(), entry.value_bytes.clone()),
                WalOp::Delete => WriteOp::delete(entry.key_bytes.clone()),
            },
        ];
        if entry.seq > *seq_guard {
            *seq_guard = entry.seq;
            ops.push(WriteOp::put(
                keys::wal_seq(&self.tenant),
                serde_json::to_vec(&json!({ "seq": entry.seq }))?,
            ));
        }
        drop(seq_guard);

        let mut tail = self.tail.lock();
        // A replicated entry may overwrite local history (e.g. both sides
        // wrote identical built-in rows); keep the tail monotonic.
        if tail.back().map(|b| entry.seq <= b.seq).unwrap_or(false) {
            tail.clear();
        }
        if tail.len() == TAIL_CAPACITY {
            tail.pop_front();
        }
        tail.push_back(entry.clone());
        Ok(ops)
    }

    /// Entries in `(start, end]`, at most `limit`. Served from the tail when
    /// it covers the range, else from disk.
    pub fn range(
        &self,
        start_exclusive: u64,
        end_inclusive: Option<u64>,
        limit: usize,
    ) -> Result<Vec<WalEntry>> {
        let end = end_inclusive.unwrap_or_else(|| self.current_seq());
        if end <= start_exclusive || limit == 0 {
            return Ok(Vec::new());
        }

        {
            let tail = self.tail.lock();
            if let Some(front) = tail.front() {
                if front.seq <= start_exclusive + 1 {
                    return Ok(tail
                        .iter()
                        .filter(|e| e.seq > start_exclusive && e.seq <= end)
                        .take(limit)
                        .cloned()
                        .collect());
                }
            }
        }

        let mut out = Vec::new();
        for seq in (start_exclusive + 1)..=end {
            if out.len() >= limit {
                break;
            }
            match self.store.get(&keys::wal_entry(&self.tenant, seq))? {
                Some(bytes) => out.push(rmp_serde::from_slice(&bytes)?),
                None => break,
            }
        }
        Ok(out)
    }
}
