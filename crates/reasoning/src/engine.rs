//! The ReAct reasoning loop.
//!
//! Thinking → tool calls → observing, repeated until the planner
//! finishes or the step bound is hit, then the evidence gate decides
//! between answering and abstaining. Multi-call steps run their calls
//! concurrently and join the whole batch before the next iteration; a
//! failing call becomes an error observation without aborting its
//! siblings.

use chrono::Utc;
use clarion_config::{EvidenceConfig, ReasoningConfig};
use clarion_core::{
    AgentState, Decision, EngineEvent, EventBus, Observation, Result, RetrievedSource,
    SearchTarget, Step, ToolCall, ToolKind, ToolRegistry,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::evidence;
use crate::planner::{Planner, PlannerAction};

/// What the loop concluded, with the full trace for inspection.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub decision: Decision,
    pub evidence_score: f32,
    /// The planner's closing thought, used as the answer seed.
    pub closing_thought: String,
    pub state: AgentState,
}

/// Progress notifications emitted while the loop runs, so streaming
/// front ends can surface each step as it happens rather than after
/// the fact. Delivery is best-effort; the loop never blocks on a slow
/// or departed listener beyond the channel's buffer.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Thought {
        content: String,
    },
    ToolCalled {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    Observed {
        id: String,
        name: String,
        output: String,
        success: bool,
    },
}

pub struct ReasoningEngine {
    planner: Arc<dyn Planner>,
    tools: Arc<ToolRegistry>,
    evidence: EvidenceConfig,
    reasoning: ReasoningConfig,
    bus: Arc<EventBus>,
}

impl ReasoningEngine {
    pub fn new(
        planner: Arc<dyn Planner>,
        tools: Arc<ToolRegistry>,
        evidence: EvidenceConfig,
        reasoning: ReasoningConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            planner,
            tools,
            evidence,
            reasoning,
            bus,
        }
    }

    /// Run the loop for one query.
    pub async fn run(&self, query: &str, skip_retrieval: bool) -> Result<EngineOutcome> {
        self.run_traced(query, skip_retrieval, None, None).await
    }

    /// Run the loop with a retrieval target and a progress channel.
    ///
    /// `target` steers retrieval tool calls at the routed collection
    /// (and its fallback chain) when the planner does not name one.
    /// `progress` receives a [`TraceEvent`] for every thought, tool
    /// call and observation as the loop produces them.
    pub async fn run_traced(
        &self,
        query: &str,
        skip_retrieval: bool,
        target: Option<SearchTarget>,
        progress: Option<mpsc::Sender<TraceEvent>>,
    ) -> Result<EngineOutcome> {
        let mut state = AgentState::new();
        state.skip_retrieval = skip_retrieval;
        let definitions = self.tools.definitions();
        let mut closing_thought = String::new();

        for iteration in 0..self.reasoning.max_steps {
            match self.planner.plan(query, &state, &definitions).await? {
                PlannerAction::Finish { thought } => {
                    debug!(iteration, "planner finished");
                    closing_thought = thought.clone();
                    emit(
                        &progress,
                        TraceEvent::Thought {
                            content: thought.clone(),
                        },
                    )
                    .await;
                    state.push_step(Step {
                        thought,
                        actions: Vec::new(),
                        observations: Vec::new(),
                    });
                    break;
                }
                PlannerAction::Act { thought, mut calls } => {
                    // Batch size is capped by the number of registered
                    // tools; anything past that is noise.
                    let cap = self.tools.len().max(1);
                    if calls.len() > cap {
                        warn!(proposed = calls.len(), cap, "truncating tool batch");
                        calls.truncate(cap);
                    }
                    if let Some(target) = &target {
                        steer_retrieval(&mut calls, target);
                    }

                    emit(
                        &progress,
                        TraceEvent::Thought {
                            content: thought.clone(),
                        },
                    )
                    .await;
                    for call in &calls {
                        emit(
                            &progress,
                            TraceEvent::ToolCalled {
                                id: call.id.clone(),
                                name: call.kind.name().to_string(),
                                arguments: call.arguments.clone(),
                            },
                        )
                        .await;
                    }

                    debug!(iteration, batch = calls.len(), "executing tool batch");
                    let observations = self.execute_batch(&calls, &mut state).await;
                    for (call, observation) in calls.iter().zip(observations.iter()) {
                        emit(
                            &progress,
                            TraceEvent::Observed {
                                id: call.id.clone(),
                                name: call.kind.name().to_string(),
                                output: observation.output.clone(),
                                success: observation.success,
                            },
                        )
                        .await;
                    }
                    state.push_step(Step {
                        thought,
                        actions: calls,
                        observations,
                    });
                }
            }
        }

        if closing_thought.is_empty() {
            warn!(max_steps = self.reasoning.max_steps, "step bound reached");
        }

        let evidence_score = evidence::score(query, &state, &self.evidence);
        let decision = evidence::decide(evidence_score, &state, &self.evidence);

        info!(
            steps = state.steps.len(),
            tool_calls = state.tool_calls_made(),
            evidence_score,
            decision = ?decision,
            "reasoning loop complete"
        );

        Ok(EngineOutcome {
            decision,
            evidence_score,
            closing_thought,
            state,
        })
    }

    /// Run every call in the batch concurrently and join them all.
    ///
    /// Observations come back in action order. Retrieved sources are
    /// recorded on the state after the batch joins.
    async fn execute_batch(
        &self,
        calls: &[ToolCall],
        state: &mut AgentState,
    ) -> Vec<Observation> {
        let results = join_all(calls.iter().map(|call| async move {
            let started = Instant::now();
            let outcome = self.tools.execute(call).await;
            (call, outcome, started.elapsed().as_millis() as u64)
        }))
        .await;

        let mut observations = Vec::with_capacity(results.len());
        for (call, outcome, duration_ms) in results {
            let observation = match outcome {
                Ok(result) => {
                    if let Some(sources) = extract_sources(result.data.as_ref()) {
                        state.add_sources(sources);
                    }
                    Observation {
                        tool: call.kind,
                        output: result.output,
                        success: result.success,
                    }
                }
                Err(e) => Observation::error(call.kind, e),
            };

            self.bus.publish(EngineEvent::ToolExecuted {
                tool_name: call.kind.name().to_string(),
                success: observation.success,
                duration_ms,
                timestamp: Utc::now(),
            });
            observations.push(observation);
        }
        observations
    }
}

fn extract_sources(data: Option<&serde_json::Value>) -> Option<Vec<RetrievedSource>> {
    let sources = data?.get("sources")?;
    serde_json::from_value(sources.clone()).ok()
}

/// Point retrieval calls at the routed target.
///
/// The planner may name a collection explicitly; only absent fields
/// are filled in from the routing decision.
fn steer_retrieval(calls: &mut [ToolCall], target: &SearchTarget) {
    for call in calls {
        if call.kind != ToolKind::VectorSearch {
            continue;
        }
        if !call.arguments.is_object() {
            call.arguments = serde_json::json!({});
        }
        // Checked just above.
        let Some(arguments) = call.arguments.as_object_mut() else {
            continue;
        };
        if !arguments.contains_key("collection") {
            arguments.insert(
                "collection".into(),
                serde_json::Value::String(target.collection.clone()),
            );
        }
        if !arguments.contains_key("fallbacks") && !target.fallbacks.is_empty() {
            arguments.insert(
                "fallbacks".into(),
                serde_json::json!(target.fallbacks),
            );
        }
        if target.fan_out {
            arguments.insert("fan_out".into(), serde_json::Value::Bool(true));
        }
    }
}

async fn emit(progress: &Option<mpsc::Sender<TraceEvent>>, event: TraceEvent) {
    if let Some(tx) = progress {
        // A departed listener is not the loop's problem.
        let _ = tx.send(event).await;
    }
}
