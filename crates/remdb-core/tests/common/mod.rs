//! Shared helpers for remdb-core integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use remdb_core::{Database, DatabaseOptions, Embedder, Result};
use tempfile::TempDir;

/// Embedding dimension used across the integration tests. Small on purpose;
/// the index dimension is configurable per database.
pub const TEST_DIM: usize = 32;

/// Deterministic token-hashing embedder: every word hashes to a bucket and
/// sign, so texts sharing words land near each other in cosine space. Makes
/// similarity assertions reproducible with no model or network.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];
        for token in text.to_lowercase().split_whitespace() {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in token.bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}

/// Open a throwaway database with the test embedding dimension.
pub fn open_db(dir: &TempDir, tenant: &str) -> Database {
    Database::open_with_options(
        dir.path(),
        tenant,
        DatabaseOptions {
            embedding_dim: TEST_DIM,
            ..Default::default()
        },
    )
    .expect("open database")
}

/// Open with the hash embedder bound.
pub fn open_db_with_embedder(dir: &TempDir, tenant: &str) -> Database {
    let db = open_db(dir, tenant);
    db.set_embedder(Arc::new(HashEmbedder::new(TEST_DIM)));
    db
}
