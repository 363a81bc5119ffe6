//! Core domain types and traits for the Clarion agentic query engine.
//!
//! This crate holds the shared vocabulary of the system: the error
//! taxonomy, per-request reasoning state, the closed tool set, the
//! model-tier capability trait, conversational memory, and the domain
//! event bus. Everything else in the workspace depends on this crate
//! and nothing here depends on anything else.

pub mod conversation;
pub mod error;
pub mod event;
pub mod model;
pub mod state;
pub mod tool;

pub use conversation::{Conversation, ConversationStore, Role, Turn, UserId};
pub use error::{
    Error, ErrorClass, GatewayError, LockError, MemoryError, Result, StoreError, ToolError,
};
pub use event::{EngineEvent, EventBus};
pub use model::{ModelBackend, TierRequest, TierResponse, Usage};
pub use state::{AgentState, Decision, ERROR_MARKER, Observation, RetrievedSource, SearchTarget, Step};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolKind, ToolRegistry, ToolResult};
