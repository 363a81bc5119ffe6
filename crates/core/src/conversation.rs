//! Conversation and per-user memory types.
//!
//! The engine only requires an async get/save interface keyed by user
//! id; physical storage is an external collaborator. All mutation of a
//! user's conversation goes through that user's exclusive lock in the
//! coordinator.

use crate::error::MemoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user (or session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A user's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: UserId,
    pub turns: Vec<Turn>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            turns: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// The most recent turns as (role, content) pairs for tier context.
    pub fn recent_context(&self, limit: usize) -> Vec<(String, String)> {
        let start = self.turns.len().saturating_sub(limit);
        self.turns[start..]
            .iter()
            .map(|t| {
                let role = match t.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                (role.to_string(), t.content.clone())
            })
            .collect()
    }
}

/// Async storage for conversational memory, keyed by user id.
///
/// Implementations: in-memory (tests and ephemeral sessions); anything
/// durable lives outside this workspace.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g. "in_memory").
    fn name(&self) -> &str;

    /// Fetch a user's conversation, if any.
    async fn get(&self, user_id: &UserId)
    -> std::result::Result<Option<Conversation>, MemoryError>;

    /// Persist a user's conversation, replacing any prior version.
    async fn save(&self, conversation: Conversation) -> std::result::Result<(), MemoryError>;
}
