//! Vector search tool — hybrid retrieval against the vector store.
//!
//! Embeds the query, runs a hybrid (dense + sparse) search on the
//! requested collection, and returns the hits as retrieved sources.
//! When the routed collection comes up empty the tool walks the ranked
//! fallback chain in order; a fan-out request searches every candidate
//! concurrently and merges the rankings. A degraded (dense-only)
//! search is reported on the event bus but is not an error from the
//! caller's point of view.

use async_trait::async_trait;
use chrono::Utc;
use clarion_core::{
    EngineEvent, EventBus, RetrievedSource, StoreError, Tool, ToolError, ToolKind, ToolResult,
};
use clarion_vectorstore::{SearchQuery, SparseVector, VectorStore};
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use crate::embed::Embedder;

pub struct VectorSearchTool {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    bus: Arc<EventBus>,
    default_collection: String,
    default_limit: usize,
}

impl VectorSearchTool {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        bus: Arc<EventBus>,
        default_collection: impl Into<String>,
        default_limit: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            bus,
            default_collection: default_collection.into(),
            default_limit,
        }
    }

    /// One hybrid search against a single collection, mapped to sources.
    async fn search_collection(
        &self,
        collection: &str,
        dense: &[f32],
        sparse: Option<&SparseVector>,
        limit: usize,
    ) -> Result<(Vec<RetrievedSource>, bool), StoreError> {
        let mut search = SearchQuery::dense(dense.to_vec(), limit);
        if let Some(sparse) = sparse {
            search = search.with_sparse(sparse.clone());
        }

        let response = self.store.search(collection, search).await?;
        if response.degraded {
            self.bus.publish(EngineEvent::SearchDegraded {
                collection: collection.to_string(),
                reason: "sparse index unavailable".into(),
                timestamp: Utc::now(),
            });
        }

        let sources = response
            .points
            .iter()
            .map(|p| RetrievedSource {
                id: p.id.clone(),
                collection: collection.to_string(),
                score: p.score,
                snippet: p
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                reference: p
                    .payload
                    .get("source")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            })
            .collect();
        Ok((sources, response.degraded))
    }

    /// Walk primary-then-fallbacks until a collection yields hits.
    async fn walk_chain(
        &self,
        collections: &[String],
        dense: &[f32],
        sparse: Option<&SparseVector>,
        limit: usize,
    ) -> Result<(Vec<RetrievedSource>, bool), StoreError> {
        let mut last_error = None;
        for (depth, collection) in collections.iter().enumerate() {
            if depth > 0 {
                self.bus.publish(EngineEvent::FallbackUsed {
                    collection: collection.clone(),
                    depth,
                    timestamp: Utc::now(),
                });
                debug!(collection = %collection, depth, "walking retrieval fallback");
            }
            match self.search_collection(collection, dense, sparse, limit).await {
                Ok((sources, degraded)) if !sources.is_empty() => {
                    return Ok((sources, degraded));
                }
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            // An error is only surfaced when there was no fallback left
            // to absorb it; empty-but-searchable stays a success.
            Some(e) if collections.len() == 1 => Err(e),
            _ => Ok((Vec::new(), false)),
        }
    }

    /// Search every candidate concurrently and merge by score.
    async fn fan_out(
        &self,
        collections: &[String],
        dense: &[f32],
        sparse: Option<&SparseVector>,
        limit: usize,
    ) -> (Vec<RetrievedSource>, bool) {
        let searches = join_all(
            collections
                .iter()
                .map(|c| self.search_collection(c, dense, sparse, limit)),
        )
        .await;

        let mut merged = Vec::new();
        let mut degraded = false;
        for outcome in searches {
            match outcome {
                Ok((sources, was_degraded)) => {
                    merged.extend(sources);
                    degraded |= was_degraded;
                }
                Err(e) => debug!(error = %e, "fan-out search leg failed"),
            }
        }
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        merged.truncate(limit);
        (merged, degraded)
    }
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::VectorSearch
    }

    fn description(&self) -> &str {
        "Search the knowledge base for passages relevant to a query. Returns scored source snippets with references."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "collection": {
                    "type": "string",
                    "description": "Collection to search (defaults to the routed collection)"
                },
                "fallbacks": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ranked alternative collections, walked when the primary has no hits"
                },
                "fan_out": {
                    "type": "boolean",
                    "description": "Search the primary and all fallbacks concurrently and merge"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of sources to return",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let primary = arguments["collection"]
            .as_str()
            .unwrap_or(&self.default_collection)
            .to_string();
        let limit = arguments["limit"].as_u64().unwrap_or(self.default_limit as u64) as usize;

        let mut collections = vec![primary.clone()];
        if let Some(fallbacks) = arguments["fallbacks"].as_array() {
            collections.extend(
                fallbacks
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|c| *c != primary)
                    .map(str::to_string),
            );
        }

        let (dense, sparse) = self.embedder.embed(query).await?;

        let searched = if arguments["fan_out"].as_bool().unwrap_or(false) {
            Ok(self
                .fan_out(&collections, &dense, sparse.as_ref(), limit)
                .await)
        } else {
            self.walk_chain(&collections, &dense, sparse.as_ref(), limit)
                .await
        };

        let (sources, degraded) = match searched {
            Ok(found) => found,
            Err(e) => {
                return Ok(ToolResult {
                    call_id: String::new(),
                    success: false,
                    output: format!("Error: search failed: {}", e),
                    data: None,
                });
            }
        };

        debug!(
            collection = %primary,
            candidates = collections.len(),
            hits = sources.len(),
            degraded,
            "vector search complete"
        );

        let output = if sources.is_empty() {
            "No relevant sources found.".to_string()
        } else {
            sources
                .iter()
                .map(|s| format!("[{:.2}] {}", s.score, s.snippet))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(serde_json::json!({
                "sources": sources,
                "degraded": degraded,
            })),
        })
    }
}
