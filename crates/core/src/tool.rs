//! Tool abstraction — the closed set of capabilities the engine can invoke.
//!
//! Tool identity is a closed enum (`ToolKind`), not a free-form string:
//! the reasoning loop resolves a tool name once, at the edge, and an
//! unknown identifier is a typed error instead of a lookup failure deep
//! inside a step. Trust is a property of the kind — a successful
//! calculator, pricing, or team-knowledge result is self-evidencing and
//! satisfies the evidence gate on its own.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// The closed set of tools the engine knows how to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Hybrid retrieval against a vector collection.
    VectorSearch,
    /// Arithmetic expression evaluation.
    Calculator,
    /// Service pricing lookup.
    PricingLookup,
    /// Internal team/directory knowledge lookup.
    TeamKnowledge,
    /// Image/vision analysis via a vision-capable model tier.
    VisionAnalysis,
}

impl ToolKind {
    /// The wire name of this tool (what the LLM sees and emits).
    pub fn name(&self) -> &'static str {
        match self {
            Self::VectorSearch => "vector_search",
            Self::Calculator => "calculator",
            Self::PricingLookup => "pricing_lookup",
            Self::TeamKnowledge => "team_knowledge",
            Self::VisionAnalysis => "vision_analysis",
        }
    }

    /// Whether a successful output from this tool is accepted as
    /// self-sufficient evidence (no corroborating retrieval required).
    pub fn is_trusted(&self) -> bool {
        matches!(
            self,
            Self::Calculator | Self::PricingLookup | Self::TeamKnowledge
        )
    }

    /// Every kind, in registration order.
    pub fn all() -> [ToolKind; 5] {
        [
            Self::VectorSearch,
            Self::Calculator,
            Self::PricingLookup,
            Self::TeamKnowledge,
            Self::VisionAnalysis,
        ]
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector_search" => Ok(Self::VectorSearch),
            "calculator" => Ok(Self::Calculator),
            "pricing_lookup" => Ok(Self::PricingLookup),
            "team_knowledge" => Ok(Self::TeamKnowledge),
            "vision_analysis" => Ok(Self::VisionAnalysis),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A request to execute a tool, as proposed by a reasoning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call id when present).
    pub id: String,

    /// Which tool to execute.
    pub kind: ToolKind,

    /// Arguments as a JSON value, validated by the tool itself.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Trust is derived from the kind, never set by callers.
    pub fn is_trusted(&self) -> bool {
        self.kind.is_trusted()
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for.
    pub call_id: String,

    /// Whether the tool executed successfully.
    pub success: bool,

    /// The output content (or an error marker on failure).
    pub output: String,

    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A capability the reasoning loop can invoke.
///
/// Implementations must tolerate retries and must go through the lock
/// coordinator for any shared state rather than assuming exclusive
/// access.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which member of the closed set this tool implements.
    fn kind(&self) -> ToolKind;

    /// Model-facing description, shown in the planner prompt.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments this tool accepts.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool against already-validated JSON arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// The definition advertised to the planner.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.kind().name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, resolved once at startup.
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool of the same kind.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    /// Look up a tool by kind.
    pub fn get(&self, kind: ToolKind) -> Option<&dyn Tool> {
        self.tools.get(&kind).map(|t| t.as_ref())
    }

    /// Definitions for every registered tool, for the planner prompt.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Resolve and run one call, stamping the call id onto the result.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.kind)
            .ok_or_else(|| ToolError::UnknownTool(call.kind.name().to_string()))?;
        let mut result = tool.execute(call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }

    /// Number of registered tools. The parallel-batch concurrency cap
    /// is bounded by this.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
