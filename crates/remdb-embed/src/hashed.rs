//! Deterministic offline embedder.
//!
//! Token feature hashing: every lowercased word hashes to a bucket and a
//! sign, contributions accumulate, and the result is L2-normalized. Texts
//! that share vocabulary land near each other in cosine space, which is
//! enough for smoke tests, CI, and air-gapped deployments where no model
//! endpoint exists. Not a semantic model; do not expect synonym recall.

use sha2::{Digest, Sha256};

use remdb_core::Embedder;

/// Feature-hashing embedder with a fixed dimension.
pub struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashedEmbedder {
    fn embed(&self, text: &str) -> remdb_core::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[..8].try_into().expect("8 bytes"))
                % self.dim as u64;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket as usize] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}
