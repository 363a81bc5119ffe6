//! Wire types for the vector store client.

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// A sparse (term-weighted) vector: parallel index/value arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        Self { indices, values }
    }

    /// Dot product against another sparse vector. Both index lists are
    /// assumed sorted ascending.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut sum = 0.0;
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// A point stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: String,

    /// Dense embedding.
    pub vector: Vec<f32>,

    /// Optional sparse embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseVector>,

    /// Arbitrary payload attached to the point.
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// A search hit with its fused or raw relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Collection creation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Dense vector dimensionality.
    pub dimension: usize,

    /// Whether the collection also indexes sparse vectors.
    #[serde(default)]
    pub sparse_enabled: bool,
}

/// A search request against one collection.
///
/// When `sparse` is absent, hybrid search degrades transparently to
/// pure dense search — same code path, same result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub vector: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseVector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    pub limit: usize,
}

impl SearchQuery {
    pub fn dense(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            sparse: None,
            filter: None,
            limit,
        }
    }

    pub fn with_sparse(mut self, sparse: SparseVector) -> Self {
        self.sparse = Some(sparse);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Search results plus a degradation marker.
///
/// `degraded` is observability-only: it is set when sparse search was
/// requested but unavailable and the client fell back to dense-only.
/// Callers never branch on it to consume results.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub points: Vec<ScoredPoint>,
    pub degraded: bool,
}
