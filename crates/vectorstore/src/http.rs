//! HTTP vector store backend.
//!
//! Speaks a Qdrant-style REST API. Every transport failure is
//! classified before the retry loop sees it; primitive operations are
//! wrapped in [`with_retries`] with the configured policy.

use async_trait::async_trait;
use clarion_config::{RetryConfig, StoreConfig};
use clarion_core::StoreError;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::filter::Filter;
use crate::retry::with_retries;
use crate::store::VectorStore;
use crate::types::{CollectionSchema, Point, ScoredPoint, SparseVector};

/// Client for a remote vector store over HTTP.
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpVectorStore {
    /// Build a client from configuration.
    pub fn new(store: &StoreConfig, retry: RetryConfig, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(store.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: store.url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    /// Send a request and classify the outcome.
    async fn send(
        &self,
        collection: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, StoreError> {
        let response = builder.send().await.map_err(classify_reqwest)?;
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(StoreError::RateLimited { retry_after_secs });
        }

        if status == 404 {
            return Err(StoreError::CollectionMissing(collection.to_string()));
        }

        if (400..500).contains(&status) {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::BadRequest { status, message });
        }

        if status >= 500 {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Server { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))
    }

    async fn search_request(
        &self,
        collection: &str,
        body: serde_json::Value,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let value = self
            .send(
                collection,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{collection}/points/search"),
                )
                .json(&body),
            )
            .await?;

        let hits = value["result"]
            .as_array()
            .ok_or_else(|| StoreError::MalformedResponse("missing result array".into()))?;

        hits.iter()
            .map(|hit| {
                let id = hit["id"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| hit["id"].as_u64().map(|n| n.to_string()))
                    .ok_or_else(|| StoreError::MalformedResponse("hit without id".into()))?;
                let score = hit["score"].as_f64().unwrap_or(0.0) as f32;
                let payload = hit["payload"]
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                Ok(ScoredPoint { id, score, payload })
            })
            .collect()
    }
}

/// Map a reqwest failure onto the store taxonomy.
fn classify_reqwest(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else {
        StoreError::Connection(e.to_string())
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_collection(
        &self,
        collection: &str,
        schema: CollectionSchema,
    ) -> Result<(), StoreError> {
        let mut body = json!({
            "vectors": { "size": schema.dimension, "distance": "Cosine" }
        });
        if schema.sparse_enabled {
            body["sparse_vectors"] = json!({ "sparse": {} });
        }

        with_retries(&self.retry, "create_collection", || async {
            self.send(
                collection,
                self.request(reqwest::Method::PUT, &format!("/collections/{collection}"))
                    .json(&body),
            )
            .await
            .map(|_| ())
        })
        .await
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), StoreError> {
        let wire_points: Vec<serde_json::Value> = points
            .iter()
            .map(|p| {
                let mut vector = json!({ "dense": &p.vector });
                if let Some(sparse) = &p.sparse {
                    vector["sparse"] = json!({
                        "indices": &sparse.indices,
                        "values": &sparse.values,
                    });
                }
                json!({ "id": &p.id, "vector": vector, "payload": &p.payload })
            })
            .collect();
        let body = json!({ "points": wire_points });

        debug!(collection, count = points.len(), "upserting points");

        with_retries(&self.retry, "upsert", || async {
            self.send(
                collection,
                self.request(
                    reqwest::Method::PUT,
                    &format!("/collections/{collection}/points"),
                )
                .json(&body),
            )
            .await
            .map(|_| ())
        })
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, StoreError> {
        let body = json!({ "ids": [id], "with_payload": true, "with_vector": true });

        let value = with_retries(&self.retry, "get", || async {
            self.send(
                collection,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{collection}/points"),
                )
                .json(&body),
            )
            .await
        })
        .await?;

        let Some(record) = value["result"].as_array().and_then(|a| a.first()) else {
            return Ok(None);
        };

        let point: Point = serde_json::from_value(record.clone())
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        Ok(Some(point))
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        let body = json!({ "points": ids });

        with_retries(&self.retry, "delete", || async {
            self.send(
                collection,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{collection}/points/delete"),
                )
                .json(&body),
            )
            .await
            .map(|_| ())
        })
        .await
    }

    async fn dense_search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut body = json!({
            "vector": { "name": "dense", "vector": vector },
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = filter {
            body["filter"] = f.to_native();
        }

        with_retries(&self.retry, "dense_search", || {
            self.search_request(collection, body.clone())
        })
        .await
    }

    async fn sparse_search(
        &self,
        collection: &str,
        sparse: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut body = json!({
            "vector": {
                "name": "sparse",
                "vector": { "indices": &sparse.indices, "values": &sparse.values },
            },
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = filter {
            body["filter"] = f.to_native();
        }

        with_retries(&self.retry, "sparse_search", || {
            self.search_request(collection, body.clone())
        })
        .await
    }
}
