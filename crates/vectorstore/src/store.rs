//! The `VectorStore` trait and the shared hybrid search path.
//!
//! Backends implement the primitive operations (CRUD plus dense and
//! sparse ranking); the hybrid `search` is a provided method so every
//! backend goes through the identical fusion/degradation code path.

use async_trait::async_trait;
use clarion_core::StoreError;
use tracing::warn;

use crate::filter::Filter;
use crate::fusion::reciprocal_rank_fusion;
use crate::types::{CollectionSchema, Point, ScoredPoint, SearchQuery, SearchResponse, SparseVector};

/// Standard RRF constant.
pub const RRF_K: u32 = 60;

/// Typed access to one or more vector collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g. "http", "in_memory").
    fn name(&self) -> &str;

    /// Create a collection, optionally with a sparse-vector schema.
    async fn create_collection(
        &self,
        collection: &str,
        schema: CollectionSchema,
    ) -> Result<(), StoreError>;

    /// Insert or replace points.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), StoreError>;

    /// Fetch a point by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, StoreError>;

    /// Delete points by id.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError>;

    /// Dense cosine-similarity ranking.
    async fn dense_search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Sparse term-overlap ranking.
    async fn sparse_search(
        &self,
        collection: &str,
        sparse: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Hybrid search.
    ///
    /// With a sparse vector present, dense and sparse rankings are
    /// fused with RRF. Without one, the same path returns the dense
    /// ranking directly — callers never branch. A sparse-side failure
    /// degrades to dense-only and marks the response instead of
    /// failing the request.
    async fn search(
        &self,
        collection: &str,
        query: SearchQuery,
    ) -> Result<SearchResponse, StoreError> {
        let dense = self
            .dense_search(collection, &query.vector, query.filter.as_ref(), query.limit)
            .await?;

        let Some(sparse_vec) = &query.sparse else {
            return Ok(SearchResponse {
                points: dense,
                degraded: false,
            });
        };

        match self
            .sparse_search(collection, sparse_vec, query.filter.as_ref(), query.limit)
            .await
        {
            Ok(sparse) => Ok(SearchResponse {
                points: reciprocal_rank_fusion(&dense, &sparse, RRF_K, query.limit),
                degraded: false,
            }),
            Err(e) => {
                warn!(collection, error = %e, "sparse search unavailable, degrading to dense-only");
                Ok(SearchResponse {
                    points: dense,
                    degraded: true,
                })
            }
        }
    }
}
