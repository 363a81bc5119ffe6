//! Hybrid vector store client.
//!
//! One trait ([`VectorStore`]) with two backends: an HTTP client for a
//! remote Qdrant-style service and an in-memory store for tests and
//! ephemeral sessions. Hybrid (dense + sparse) search is a provided
//! trait method, so fusion and degradation behave identically across
//! backends.

pub mod filter;
pub mod fusion;
pub mod http;
pub mod in_memory;
pub mod retry;
pub mod store;
pub mod types;

pub use filter::Filter;
pub use fusion::{cosine_similarity, reciprocal_rank_fusion};
pub use http::HttpVectorStore;
pub use in_memory::InMemoryStore;
pub use retry::{backoff_delay, with_retries};
pub use store::{VectorStore, RRF_K};
pub use types::{
    CollectionSchema, Point, ScoredPoint, SearchQuery, SearchResponse, SparseVector,
};
