//! Lock coordination for shared engine state.
//!
//! Per-user conversation memory takes an exclusive lock for writes;
//! collection ingestion state takes shared locks for queries and an
//! exclusive lock for re-indexing. Also home to the in-memory
//! conversation store used by tests and single-process deployments.

pub mod coordinator;
pub mod memory;

pub use coordinator::{LockCoordinator, LockGuard, LockMode, ResourceKind};
pub use memory::InMemoryConversationStore;
