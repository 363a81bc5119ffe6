//! Confidence-scored collection routing.
//!
//! The router picks the vector collection a query should hit, using a
//! per-collection keyword index plus operator-configured priority
//! patterns. Low-confidence decisions carry a ranked fallback chain so
//! the caller can walk alternatives instead of failing. A specialized
//! detector runs alongside: queries that need cross-collection
//! synthesis or multi-hop research are flagged for the composite
//! service instead of a single collection.

pub mod stats;

use chrono::Utc;
use clarion_config::RouterConfig;
use clarion_core::{EngineEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub use stats::{RouterStats, StatsSnapshot};

/// Where a query should be sent, and how sure we are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub primary_collection: String,
    /// Ranked alternatives, attached when confidence is below the floor.
    pub fallback_chain: Vec<String>,
    pub confidence: f32,
    /// Set when the query should bypass single-collection retrieval.
    pub specialized_service: Option<String>,
}

pub struct CollectionRouter {
    config: RouterConfig,
    stats: RouterStats,
    bus: Arc<EventBus>,
}

impl CollectionRouter {
    pub fn new(config: RouterConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            stats: RouterStats::new(),
            bus,
        }
    }

    /// Route a query, optionally considering recent conversation text.
    pub fn route(&self, query: &str, context: Option<&str>) -> RoutingDecision {
        let haystack = match context {
            Some(ctx) => format!("{} {}", query.to_lowercase(), ctx.to_lowercase()),
            None => query.to_lowercase(),
        };

        let specialized_service = self.detect_specialized(&haystack);
        let mut decision = self.score_collections(&haystack, specialized_service);

        // A specialized query spans collections: hand the caller every
        // other candidate so retrieval can fan out instead of sticking
        // to the single primary.
        if decision.specialized_service.is_some() {
            decision.fallback_chain = self
                .config
                .collections
                .iter()
                .map(|c| c.name.clone())
                .filter(|n| *n != decision.primary_collection)
                .collect();
        }

        debug!(
            collection = %decision.primary_collection,
            confidence = decision.confidence,
            fallbacks = decision.fallback_chain.len(),
            specialized = decision.specialized_service.as_deref().unwrap_or("none"),
            "routing decision"
        );

        self.stats.record(
            &decision.primary_collection,
            decision.confidence,
            decision.specialized_service.is_some(),
            decision.confidence < self.config.confidence_floor,
        );
        self.bus.publish(EngineEvent::RouteSelected {
            collection: decision.primary_collection.clone(),
            confidence: decision.confidence,
            fallback_len: decision.fallback_chain.len(),
            specialized: decision.specialized_service.clone(),
            timestamp: Utc::now(),
        });

        decision
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn detect_specialized(&self, haystack: &str) -> Option<String> {
        for svc in &self.config.specialized {
            if svc
                .patterns
                .iter()
                .any(|p| haystack.contains(&p.to_lowercase()))
            {
                return Some(svc.service.clone());
            }
        }
        None
    }

    fn score_collections(
        &self,
        haystack: &str,
        specialized_service: Option<String>,
    ) -> RoutingDecision {
        // No collection metadata: degrade to the default rather than fail.
        if self.config.collections.is_empty() {
            return RoutingDecision {
                primary_collection: self.config.default_collection.clone(),
                fallback_chain: Vec::new(),
                confidence: 0.0,
                specialized_service,
            };
        }

        // Priority patterns force a collection regardless of keyword score.
        for collection in &self.config.collections {
            if collection
                .priority_patterns
                .iter()
                .any(|p| haystack.contains(&p.to_lowercase()))
            {
                return RoutingDecision {
                    primary_collection: collection.name.clone(),
                    fallback_chain: Vec::new(),
                    confidence: 1.0,
                    specialized_service,
                };
            }
        }

        let mut ranked: Vec<(usize, &str)> = self
            .config
            .collections
            .iter()
            .map(|c| {
                let hits = c
                    .keywords
                    .iter()
                    .filter(|k| haystack.contains(&k.to_lowercase()))
                    .count();
                (hits, c.name.as_str())
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let (top_hits, top_name) = ranked[0];
        if top_hits == 0 {
            // Nothing matched: best candidate is the default, everything
            // else becomes the fallback chain.
            return RoutingDecision {
                primary_collection: self.config.default_collection.clone(),
                fallback_chain: self
                    .config
                    .collections
                    .iter()
                    .map(|c| c.name.clone())
                    .filter(|n| *n != self.config.default_collection)
                    .collect(),
                confidence: 0.0,
                specialized_service,
            };
        }

        // One hit = 0.5, asymptotically approaching 1.0 with more hits.
        let confidence = top_hits as f32 / (top_hits as f32 + 1.0);
        let fallback_chain = if confidence < self.config.confidence_floor {
            ranked
                .iter()
                .skip(1)
                .map(|(_, name)| name.to_string())
                .collect()
        } else {
            Vec::new()
        };

        RoutingDecision {
            primary_collection: top_name.to_string(),
            fallback_chain,
            confidence,
            specialized_service,
        }
    }
}
