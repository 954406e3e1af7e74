//! Ordered KV layer over rocksdb.
//!
//! A thin wrapper owning the database handle. Higher components compose
//! [`WriteOp`] batches so that one logical mutation (entity row + index
//! postings + WAL records + vector-map rows) commits atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};

use crate::error::Result;

/// One rocksdb instance per directory within this process. rocksdb holds an
/// exclusive file lock per directory, while several tenant handles may open
/// the same database path; they share the instance and isolate by key
/// prefix. The map holds weak references so closing every handle releases
/// the lock.
static OPEN_STORES: Lazy<Mutex<HashMap<PathBuf, Weak<DB>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// One operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WriteOp {
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        WriteOp::Put { key, value }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        WriteOp::Delete { key }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } => key,
            WriteOp::Delete { key } => key,
        }
    }
}

/// Handle to the ordered KV store. Cheap to clone; all clones share one
/// rocksdb instance. The store directory is single-writer.
#[derive(Clone, Debug)]
pub struct Store {
    db: Arc<DB>,
}

impl Store {
    /// Open (or create) the store under `path`. Same-path opens within the
    /// process share one underlying instance.
    pub fn open(path: &Path) -> Result<Self> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut stores = OPEN_STORES.lock();
        if let Some(existing) = stores.get(&canonical).and_then(Weak::upgrade) {
            return Ok(Self { db: existing });
        }
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = Arc::new(DB::open(&opts, path)?);
        stores.insert(canonical, Arc::downgrade(&db));
        Ok(Self { db })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    /// Commit a batch atomically. An empty batch is a no-op.
    pub fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.put(key, value),
                WriteOp::Delete { key } => batch.delete(key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Values only, for callers that decode rows without the key.
    pub fn scan_prefix_values(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let (_dir, store) = open_store();
        store.put(b"k1", b"v1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        store.delete(b"k1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);
    }

    #[test]
    fn batch_is_atomic_and_ordered() {
        let (_dir, store) = open_store();
        store.put(b"stale", b"x").unwrap();
        store
            .batch(vec![
                WriteOp::put(b"a".to_vec(), b"1".to_vec()),
                WriteOp::put(b"b".to_vec(), b"2".to_vec()),
                WriteOp::delete(b"stale".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get(b"stale").unwrap(), None);
    }

    #[test]
    fn scan_prefix_stops_at_boundary() {
        let (_dir, store) = open_store();
        store.put(b"entity:t1:a", b"1").unwrap();
        store.put(b"entity:t1:b", b"2").unwrap();
        store.put(b"entity:t2:c", b"3").unwrap();
        store.put(b"schema:t1:x", b"4").unwrap();

        let rows = store.scan_prefix(b"entity:t1:").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"entity:t1:a".to_vec());
        assert_eq!(rows[1].0, b"entity:t1:b".to_vec());
    }
}
