//! Query embedding seam.
//!
//! The engine only needs a function from text to a dense vector plus
//! an optional sparse term vector. Real deployments plug in a model
//! service; [`HashingEmbedder`] gives a deterministic, dependency-free
//! implementation that keeps hybrid search exercisable in tests.

use async_trait::async_trait;
use clarion_core::ToolError;
use clarion_vectorstore::SparseVector;

/// Turns text into the vectors a hybrid search needs.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<(Vec<f32>, Option<SparseVector>), ToolError>;
}

/// Feature-hashing embedder.
///
/// Dense: tokens hashed into a fixed number of buckets, L2-normalized.
/// Sparse: one index per distinct token (FNV-1a hash), value = term
/// frequency. Deterministic across runs and platforms.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(token: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in token.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<(Vec<f32>, Option<SparseVector>), ToolError> {
        let tokens = tokens(text);
        if tokens.is_empty() {
            return Ok((vec![0.0; self.dimension], None));
        }

        let mut dense = vec![0.0f32; self.dimension];
        let mut counts: std::collections::BTreeMap<u32, f32> = std::collections::BTreeMap::new();
        for token in &tokens {
            let h = fnv1a(token);
            dense[(h as usize) % self.dimension] += 1.0;
            *counts.entry(h).or_default() += 1.0;
        }

        let norm = dense.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut dense {
                *v /= norm;
            }
        }

        let (indices, values) = counts.into_iter().unzip();
        Ok((dense, Some(SparseVector::new(indices, values))))
    }
}
