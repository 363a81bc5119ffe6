//! Per-request reasoning state.
//!
//! `AgentState` owns the ordered Thought → Action → Observation trace
//! for one request. It is created per request, mutated only by the
//! reasoning engine, and discarded at request end. Steps are immutable
//! once appended — the evidence score is always recomputed from the
//! recorded trace, never cached across policy decisions.

use crate::tool::{ToolCall, ToolKind};
use serde::{Deserialize, Serialize};

/// Prefix that marks a failed observation in the trace.
pub const ERROR_MARKER: &str = "Error:";

/// A source retrieved during the loop, kept for evidence scoring and
/// citation attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedSource {
    /// Point id in the originating collection.
    pub id: String,
    /// Which collection it came from.
    pub collection: String,
    /// Relevance score reported by the store.
    pub score: f32,
    /// Text snippet used for context assembly.
    pub snippet: String,
    /// Optional human-readable source reference (URL, document title).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Where retrieval should look for one request: the routed collection,
/// ranked alternatives to walk when it comes up empty, and whether to
/// fan out across all of them at once for cross-collection research.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchTarget {
    pub collection: String,
    /// Ranked alternatives, tried in order when the primary is empty.
    pub fallbacks: Vec<String>,
    /// Search every candidate concurrently and merge the rankings
    /// instead of walking the fallbacks one by one.
    pub fan_out: bool,
}

impl SearchTarget {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fallbacks: Vec::new(),
            fan_out: false,
        }
    }
}

/// The result of one tool call within a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Which tool produced this observation.
    pub tool: ToolKind,
    /// Tool output text, or an error marker on failure.
    pub output: String,
    /// Whether the call succeeded.
    pub success: bool,
}

impl Observation {
    pub fn ok(tool: ToolKind, output: impl Into<String>) -> Self {
        Self {
            tool,
            output: output.into(),
            success: true,
        }
    }

    pub fn error(tool: ToolKind, message: impl std::fmt::Display) -> Self {
        Self {
            tool,
            output: format!("{ERROR_MARKER} {message}"),
            success: false,
        }
    }

    /// A trusted tool that returned without an error marker satisfies
    /// the evidence gate on its own.
    pub fn is_trusted_success(&self) -> bool {
        self.success && self.tool.is_trusted() && !self.output.starts_with(ERROR_MARKER)
    }
}

/// One iteration of the reasoning loop.
///
/// A step may carry zero tool calls (a pure thought before answering)
/// or several (a parallel batch). Observations line up with actions
/// by index once the batch has fully joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// The model's free-text reasoning for this iteration.
    pub thought: String,
    /// Tool calls proposed in this step.
    pub actions: Vec<ToolCall>,
    /// One observation per action, in action order.
    pub observations: Vec<Observation>,
}

/// Terminal decision of the reasoning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Evidence sufficient (or trusted tool fired) — produce an answer.
    Answering,
    /// Evidence insufficient — return the fixed abstain message.
    Abstaining,
}

/// Per-request reasoning state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    /// Completed steps, in order.
    pub steps: Vec<Step>,
    /// Set when intent classification decided no retrieval is needed.
    pub skip_retrieval: bool,
    /// Sources gathered by retrieval tools during the loop.
    pub sources: Vec<RetrievedSource>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed step. Steps are never edited afterwards.
    pub fn push_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Record sources retrieved by a search observation.
    pub fn add_sources(&mut self, sources: impl IntoIterator<Item = RetrievedSource>) {
        self.sources.extend(sources);
    }

    /// Whether any step contains a trusted tool call with a non-error
    /// observation.
    pub fn has_trusted_success(&self) -> bool {
        self.steps
            .iter()
            .flat_map(|s| s.observations.iter())
            .any(Observation::is_trusted_success)
    }

    /// Total tool calls made so far.
    pub fn tool_calls_made(&self) -> usize {
        self.steps.iter().map(|s| s.actions.len()).sum()
    }

    /// The assembled retrieval context, used for lexical-overlap scoring
    /// and for grounding the final generation.
    pub fn context_text(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.snippet.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
