//! Domain event system — the observability side-channel.
//!
//! Routing statistics, breaker transitions, tool executions, token
//! usage, and lock contention are published here as fire-and-forget
//! events. Nothing in the engine's behavior depends on whether anyone
//! is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// The router chose a collection for a request.
    RouteSelected {
        collection: String,
        confidence: f32,
        fallback_len: usize,
        specialized: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A fallback collection was actually used.
    FallbackUsed {
        collection: String,
        depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed.
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A model tier was invoked.
    TierInvoked {
        tier: String,
        model: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost_usd: f64,
        duration_ms: u64,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A circuit breaker changed state.
    BreakerTransition {
        tier: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// A lock was acquired after measurable contention.
    LockContended {
        resource: String,
        waited_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A lock acquisition timed out.
    LockTimeout {
        resource: String,
        timeout_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Hybrid search degraded to dense-only for a collection.
    SearchDegraded {
        collection: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A request finished with one of the three user-visible outcomes.
    RequestCompleted {
        outcome: String, // "answered", "abstained", "failed"
        steps: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for engine events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publishing
/// never blocks and never fails; a bus with no subscribers drops events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<EngineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
