//! In-memory vector store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use clarion_core::StoreError;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::filter::Filter;
use crate::fusion::cosine_similarity;
use crate::store::VectorStore;
use crate::types::{CollectionSchema, Point, ScoredPoint, SparseVector};

struct CollectionData {
    schema: CollectionSchema,
    points: Vec<Point>,
}

/// A vector store backed by process memory.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn rank<F>(data: &CollectionData, filter: Option<&Filter>, limit: usize, score: F) -> Vec<ScoredPoint>
    where
        F: Fn(&Point) -> Option<f32>,
    {
        let mut scored: Vec<ScoredPoint> = data
            .points
            .iter()
            .filter(|p| filter.map(|f| f.matches(&p.payload)).unwrap_or(true))
            .filter_map(|p| {
                score(p).map(|s| ScoredPoint {
                    id: p.id.clone(),
                    score: s,
                    payload: p.payload.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        scored
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_collection(
        &self,
        collection: &str,
        schema: CollectionSchema,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections.insert(
            collection.to_string(),
            CollectionData {
                schema,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;

        for point in points {
            if point.vector.len() != data.schema.dimension {
                return Err(StoreError::BadRequest {
                    status: 400,
                    message: format!(
                        "vector dimension {} does not match collection dimension {}",
                        point.vector.len(),
                        data.schema.dimension
                    ),
                });
            }
            data.points.retain(|p| p.id != point.id);
            data.points.push(point);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, StoreError> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;
        Ok(data.points.iter().find(|p| p.id == id).cloned())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;
        data.points.retain(|p| !ids.contains(&p.id));
        Ok(())
    }

    async fn dense_search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;
        Ok(Self::rank(data, filter, limit, |p| {
            Some(cosine_similarity(&p.vector, vector))
        }))
    }

    async fn sparse_search(
        &self,
        collection: &str,
        sparse: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;

        if !data.schema.sparse_enabled {
            return Err(StoreError::BadRequest {
                status: 400,
                message: format!("collection {collection} has no sparse schema"),
            });
        }

        Ok(Self::rank(data, filter, limit, |p| {
            p.sparse.as_ref().map(|s| s.dot(sparse))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchQuery;
    use serde_json::json;

    fn point(id: &str, vector: Vec<f32>, sparse: Option<SparseVector>) -> Point {
        let mut payload = serde_json::Map::new();
        payload.insert("text".into(), json!(format!("content {id}")));
        Point {
            id: id.into(),
            vector,
            sparse,
            payload,
        }
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .create_collection(
                "kb",
                CollectionSchema {
                    dimension: 2,
                    sparse_enabled: true,
                },
            )
            .await
            .unwrap();
        store
            .upsert(
                "kb",
                vec![
                    point("a", vec![1.0, 0.0], Some(SparseVector::new(vec![1], vec![1.0]))),
                    point("b", vec![0.0, 1.0], Some(SparseVector::new(vec![2], vec![1.0]))),
                    point("c", vec![0.7, 0.7], None),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = seeded_store().await;

        let fetched = store.get("kb", "a").await.unwrap().unwrap();
        assert_eq!(fetched.id, "a");

        store.delete("kb", &["a".to_string()]).await.unwrap();
        assert!(store.get("kb", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let store = seeded_store().await;
        store
            .upsert("kb", vec![point("a", vec![0.0, 1.0], None)])
            .await
            .unwrap();
        let fetched = store.get("kb", "a").await.unwrap().unwrap();
        assert_eq!(fetched.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_bad_request() {
        let store = seeded_store().await;
        let err = store
            .upsert("kb", vec![point("x", vec![1.0, 0.0, 0.0], None)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn missing_collection_errors() {
        let store = InMemoryStore::new();
        let err = store.get("nope", "a").await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionMissing(_)));
    }

    #[tokio::test]
    async fn dense_search_ranks_by_cosine() {
        let store = seeded_store().await;
        let response = store
            .search("kb", SearchQuery::dense(vec![1.0, 0.0], 3))
            .await
            .unwrap();
        assert_eq!(response.points[0].id, "a");
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn hybrid_search_fuses_sparse_signal() {
        let store = seeded_store().await;
        // Dense slightly prefers "a"; sparse strongly votes for "b".
        let query = SearchQuery::dense(vec![0.6, 0.8], 3)
            .with_sparse(SparseVector::new(vec![2], vec![1.0]));
        let response = store.search("kb", query).await.unwrap();
        assert!(!response.degraded);
        assert_eq!(response.points[0].id, "b");
    }

    #[tokio::test]
    async fn filtered_search_excludes_non_matching() {
        let store = seeded_store().await;
        let query = SearchQuery::dense(vec![1.0, 0.0], 3)
            .with_filter(Filter::eq("text", "content b"));
        let response = store.search("kb", query).await.unwrap();
        assert_eq!(response.points.len(), 1);
        assert_eq!(response.points[0].id, "b");
    }
}
