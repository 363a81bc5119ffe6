//! Planning seam between the reasoning loop and the model tiers.
//!
//! The engine asks a `Planner` what to do next; the production
//! implementation prompts an LLM tier through the gateway and parses
//! its JSON action format. Tests script the planner directly.

use async_trait::async_trait;
use clarion_core::{
    AgentState, GatewayError, TierRequest, ToolCall, ToolDefinition, ToolKind,
};
use clarion_gateway::LlmGateway;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// What the next loop iteration should do.
#[derive(Debug, Clone)]
pub enum PlannerAction {
    /// Execute one or more tool calls, then observe.
    Act {
        thought: String,
        calls: Vec<ToolCall>,
    },
    /// Stop the loop and produce an answer from the gathered evidence.
    Finish { thought: String },
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        query: &str,
        state: &AgentState,
        tools: &[ToolDefinition],
    ) -> Result<PlannerAction, GatewayError>;
}

/// Planner that prompts a model tier for the next action.
///
/// The model is asked to reply with a single JSON object, either
/// `{"thought": "...", "actions": [{"tool": "...", "arguments": {...}}]}`
/// or `{"thought": "...", "done": true}`. Replies that do not parse are
/// treated as a finish — the model answered in prose.
pub struct TierPlanner {
    gateway: Arc<LlmGateway>,
    tier: String,
    context: Vec<(String, String)>,
}

impl TierPlanner {
    pub fn new(gateway: Arc<LlmGateway>, tier: impl Into<String>) -> Self {
        Self {
            gateway,
            tier: tier.into(),
            context: Vec::new(),
        }
    }

    /// Attach recent conversation turns as context.
    pub fn with_context(mut self, context: Vec<(String, String)>) -> Self {
        self.context = context;
        self
    }

    fn build_prompt(&self, query: &str, state: &AgentState, tools: &[ToolDefinition]) -> String {
        let tool_list = tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "You are answering a user question step by step, using tools.\n\
             Available tools:\n{tool_list}\n\n\
             Reply with exactly one JSON object. To call tools:\n\
             {{\"thought\": \"...\", \"actions\": [{{\"tool\": \"name\", \"arguments\": {{...}}}}]}}\n\
             When you have enough information:\n\
             {{\"thought\": \"...\", \"done\": true}}\n\n\
             Question: {query}\n"
        );

        for (i, step) in state.steps.iter().enumerate() {
            prompt.push_str(&format!("\nStep {}: {}\n", i + 1, step.thought));
            for (action, observation) in step.actions.iter().zip(step.observations.iter()) {
                prompt.push_str(&format!(
                    "  {} -> {}\n",
                    action.kind.name(),
                    observation.output
                ));
            }
        }

        prompt
    }
}

/// Parse the model's reply into an action. Non-JSON replies finish the
/// loop with the reply as the closing thought.
pub fn parse_action(text: &str) -> PlannerAction {
    let Some(json) = extract_json(text) else {
        return PlannerAction::Finish {
            thought: text.trim().to_string(),
        };
    };

    let thought = json["thought"].as_str().unwrap_or_default().to_string();

    if json["done"].as_bool().unwrap_or(false) {
        return PlannerAction::Finish { thought };
    }

    let Some(actions) = json["actions"].as_array() else {
        return PlannerAction::Finish { thought };
    };

    let calls: Vec<ToolCall> = actions
        .iter()
        .filter_map(|a| {
            let name = a["tool"].as_str()?;
            let kind = ToolKind::from_str(name).ok()?;
            Some(ToolCall {
                id: Uuid::new_v4().to_string(),
                kind,
                arguments: a.get("arguments").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();

    if calls.is_empty() {
        PlannerAction::Finish { thought }
    } else {
        PlannerAction::Act { thought, calls }
    }
}

fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok()
}

#[async_trait]
impl Planner for TierPlanner {
    async fn plan(
        &self,
        query: &str,
        state: &AgentState,
        tools: &[ToolDefinition],
    ) -> Result<PlannerAction, GatewayError> {
        let prompt = self.build_prompt(query, state, tools);
        let mut request = TierRequest::new(prompt);
        request.context = self.context.clone();

        let response = self.gateway.generate(&self.tier, request).await?;
        debug!(tier = %response.used_tier, "planner response received");
        Ok(parse_action(&response.text))
    }
}
