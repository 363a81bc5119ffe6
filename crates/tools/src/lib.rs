//! The closed tool set for the query engine.
//!
//! Five tools: vector search (retrieval), calculator, pricing lookup,
//! team knowledge lookup, and vision analysis. Calculator, pricing and
//! team knowledge form the trusted set — a successful call from any of
//! them satisfies the evidence gate on its own.

pub mod calculator;
pub mod embed;
pub mod pricing_lookup;
pub mod team_knowledge;
pub mod vector_search;
pub mod vision_analysis;

use clarion_core::{EventBus, ModelBackend, ToolRegistry};
use clarion_vectorstore::VectorStore;
use std::sync::Arc;

pub use embed::{Embedder, HashingEmbedder};

/// Create the standard tool registry.
///
/// Vector search is wired to the given store and embedder; vision
/// analysis is registered only when a vision-capable backend is
/// available.
pub fn default_registry(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    bus: Arc<EventBus>,
    default_collection: impl Into<String>,
    default_limit: usize,
    vision_backend: Option<Arc<dyn ModelBackend>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(vector_search::VectorSearchTool::new(
        store,
        embedder,
        bus,
        default_collection,
        default_limit,
    )));
    registry.register(Box::new(calculator::CalculatorTool));
    registry.register(Box::new(pricing_lookup::PricingLookupTool::new()));
    registry.register(Box::new(team_knowledge::TeamKnowledgeTool::new()));
    if let Some(backend) = vision_backend {
        registry.register(Box::new(vision_analysis::VisionAnalysisTool::new(backend)));
    }
    registry
}
