//! In-memory ANN index over L2-normalized vectors (cosine space).
//!
//! The HNSW structure is guarded by an external read-write lock: searches
//! take the read side and may run in parallel, inserts are exclusive. The
//! index file on disk is only a snapshot; the durable source of truth for
//! rebuilds is the `vector_map` plus the embeddings stored on entities, so
//! losing a snapshot between saves is tolerable.
//!
//! HNSW cannot grow past its `max_elements`; reaching capacity triggers an
//! in-place rebuild at double capacity from the retained vectors. Handles
//! are u32s assigned by the caller; for normalized vectors cosine similarity
//! equals inner product, so one index serves both similarity forms.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// HNSW construction parameters, matching common defaults for this scale.
const MAX_NB_CONNECTION: usize = 16;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;

/// Search breadth.
pub const DEFAULT_EF_SEARCH: usize = 50;

/// Initial capacity; doubled on rebuild when exhausted.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Durable snapshot payload: enough to rebuild the structure by insertion.
#[derive(Debug, Serialize, Deserialize)]
struct VectorSnapshot {
    dim: usize,
    entries: Vec<(u32, Vec<f32>)>,
}

struct IndexState {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// handle → normalized vector; retained for rebuilds and snapshots.
    vectors: HashMap<u32, Vec<f32>>,
    capacity: usize,
}

impl IndexState {
    fn build(capacity: usize) -> Self {
        Self {
            hnsw: Hnsw::new(MAX_NB_CONNECTION, capacity, MAX_LAYER, EF_CONSTRUCTION, DistCosine {}),
            vectors: HashMap::new(),
            capacity,
        }
    }

    /// Rebuild at (at least) double capacity, reinserting every vector.
    fn grow(&mut self) {
        let capacity = (self.capacity * 2).max(self.vectors.len() + 1);
        let mut next = Self::build(capacity);
        for (handle, vector) in &self.vectors {
            next.hnsw.insert((vector, *handle as usize));
        }
        next.vectors = std::mem::take(&mut self.vectors);
        *self = next;
    }
}

/// ANN index over vectors of one fixed dimension.
pub struct VectorIndex {
    dim: usize,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            state: RwLock::new(IndexState::build(capacity.max(1))),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.state.read().vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(DbError::DimMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert (or re-insert under a fresh handle) one vector.
    pub fn add(&self, handle: u32, vector: &[f32]) -> Result<()> {
        self.check_dim(vector)?;
        let normalized = l2_normalize(vector);
        let mut state = self.state.write();
        if state.vectors.len() >= state.capacity {
            state.grow();
        }
        state.hnsw.insert((&normalized, handle as usize));
        state.vectors.insert(handle, normalized);
        Ok(())
    }

    /// Top-k handles by cosine similarity, best first. Scores ∈ [-1, 1].
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>> {
        self.check_dim(query)?;
        let state = self.state.read();
        if state.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let normalized = l2_normalize(query);
        let k = k.min(state.vectors.len());
        let neighbours = state
            .hnsw
            .search(&normalized, k, DEFAULT_EF_SEARCH.max(k));
        Ok(neighbours
            .into_iter()
            .map(|n| (n.d_id as u32, 1.0 - n.distance))
            .collect())
    }

    /// Forget a handle. The HNSW point itself is abandoned until the next
    /// rebuild; callers filter search hits through the handle map.
    pub fn forget(&self, handle: u32) {
        self.state.write().vectors.remove(&handle);
    }

    /// Snapshot the current vectors to `path` (write temp file + rename).
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let state = self.state.read();
            VectorSnapshot {
                dim: self.dim,
                entries: state
                    .vectors
                    .iter()
                    .map(|(h, v)| (*h, v.clone()))
                    .collect(),
            }
        };
        let bytes = rmp_serde::to_vec(&snapshot)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a snapshot if present and dimension-compatible. Returns the
    /// number of vectors restored, or `None` when the snapshot is missing
    /// or stale (caller falls back to rebuilding from stored embeddings).
    pub fn load_snapshot(&self, path: &Path) -> Result<Option<usize>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let snapshot: VectorSnapshot = match rmp_serde::from_slice(&bytes) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!("discarding unreadable vector snapshot: {err}");
                return Ok(None);
            }
        };
        if snapshot.dim != self.dim {
            tracing::warn!(
                "discarding vector snapshot with dimension {} (index is {})",
                snapshot.dim,
                self.dim
            );
            return Ok(None);
        }
        let count = snapshot.entries.len();
        let mut state = self.state.write();
        *state = IndexState::build(state.capacity.max(count + 1));
        for (handle, vector) in snapshot.entries {
            state.hnsw.insert((&vector, handle as usize));
            state.vectors.insert(handle, vector);
        }
        Ok(Some(count))
    }
}

/// L2-normalize, leaving zero vectors untouched.
fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter().map(|x| x / norm).collect()
    } else {
        vector.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn basis(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn knn_ranks_by_cosine() {
        let index = VectorIndex::new(4, 16);
        index.add(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.9, 0.1, 0.0, 0.0]).unwrap();
        index.add(3, &[0.0, 0.0, 1.0, 0.0]).unwrap();

        let hits = index.knn(&basis(4, 0), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 > 0.99);
        assert_eq!(hits[1].0, 2);
        assert!(hits[1].1 > 0.9 && hits[1].1 < hits[0].1);
    }

    #[test]
    fn dim_mismatch_is_rejected() {
        let index = VectorIndex::new(4, 16);
        let err = index.add(1, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            DbError::DimMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let index = VectorIndex::new(3, 2);
        for i in 0..8u32 {
            index
                .add(i, &[i as f32 + 1.0, 1.0, 0.5])
                .unwrap();
        }
        assert_eq!(index.len(), 8);
        assert_eq!(index.knn(&[1.0, 1.0, 0.5], 3).unwrap().len(), 3);
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index.hnsw");

        let index = VectorIndex::new(4, 16);
        index.add(7, &basis(4, 1)).unwrap();
        index.add(9, &basis(4, 2)).unwrap();
        index.save_snapshot(&path).unwrap();

        let restored = VectorIndex::new(4, 16);
        assert_eq!(restored.load_snapshot(&path).unwrap(), Some(2));
        let hits = restored.knn(&basis(4, 1), 1).unwrap();
        assert_eq!(hits[0].0, 7);
    }

    #[test]
    fn stale_snapshot_dimension_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index.hnsw");

        let index = VectorIndex::new(4, 16);
        index.add(1, &basis(4, 0)).unwrap();
        index.save_snapshot(&path).unwrap();

        let other = VectorIndex::new(8, 16);
        assert_eq!(other.load_snapshot(&path).unwrap(), None);
        assert!(other.is_empty());
    }
}
