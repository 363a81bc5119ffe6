//! Model tier abstraction — the capability the gateway orchestrates.
//!
//! A `ModelBackend` knows how to send a prompt to one language-model
//! tier and get text back. The gateway treats each tier as opaque; the
//! cascade, breakers, and cost accounting live above this trait.

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token usage reported by a tier invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A request sent to one model tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierRequest {
    /// The assembled prompt.
    pub prompt: String,

    /// Prior conversation turns, oldest first, as (role, content) pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<(String, String)>,

    /// Tool schemas the model may emit calls for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_schema: Option<serde_json::Value>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl TierRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: Vec::new(),
            tool_schema: None,
            max_tokens: None,
        }
    }
}

/// A response from one model tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierResponse {
    /// Generated text.
    pub text: String,

    /// Token usage for this invocation.
    pub usage: Usage,

    /// Which model actually responded.
    pub model: String,
}

/// The capability interface for one language-model tier.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A stable identifier for this tier (e.g. "primary", "fallback").
    fn tier_id(&self) -> &str;

    /// The underlying model name, used for pricing lookups.
    fn model(&self) -> &str;

    /// Invoke the model once.
    async fn invoke(
        &self,
        request: TierRequest,
    ) -> std::result::Result<TierResponse, GatewayError>;
}
