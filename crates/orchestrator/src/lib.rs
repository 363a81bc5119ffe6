//! Request orchestration: the front door of the engine.
//!
//! One request flows conversation load → intent check → routing →
//! reasoning → answer composition → response pipeline → persistence,
//! with the lock coordinator guarding conversation writes and
//! collection reads along the way. Whatever happens inside, the caller
//! sees exactly one of three outcomes: an answer, the abstain message,
//! or a hard failure message.

pub mod stream_event;

use chrono::Utc;
use clarion_config::{LockConfig, ReasoningConfig};
use clarion_core::{
    AgentState, Conversation, ConversationStore, Decision, EngineEvent, EventBus, RetrievedSource,
    SearchTarget, TierRequest, Turn, UserId,
};
use clarion_gateway::{GatewayResponse, LlmGateway};
use clarion_locks::{LockCoordinator, LockMode, ResourceKind};
use clarion_pipeline::{Draft, ResponsePipeline};
use clarion_reasoning::{ABSTAIN_MESSAGE, EngineOutcome, ReasoningEngine, TraceEvent};
use clarion_router::CollectionRouter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use stream_event::{EventGate, MAX_CONSECUTIVE_MALFORMED, StreamEvent, StreamFatal};

/// Shown when the whole model cascade is unavailable.
pub const HARD_FAILURE_MESSAGE: &str =
    "Something went wrong while processing your request. Please try again in a moment.";

/// What the user ends up seeing. Nothing else escapes the engine.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answer {
        text: String,
        sources: Vec<RetrievedSource>,
        used_tier: Option<String>,
    },
    Abstain {
        message: String,
    },
    Failure {
        message: String,
    },
}

impl QueryOutcome {
    /// The user-visible reply text.
    pub fn text(&self) -> &str {
        match self {
            QueryOutcome::Answer { text, .. } => text,
            QueryOutcome::Abstain { message } | QueryOutcome::Failure { message } => message,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            QueryOutcome::Answer { .. } => "answered",
            QueryOutcome::Abstain { .. } => "abstained",
            QueryOutcome::Failure { .. } => "failed",
        }
    }
}

struct Executed {
    outcome: QueryOutcome,
    state: AgentState,
    evidence_score: f32,
    used_tier: Option<String>,
}

pub struct Orchestrator {
    router: Arc<CollectionRouter>,
    engine: Arc<ReasoningEngine>,
    gateway: Arc<LlmGateway>,
    pipeline: Arc<ResponsePipeline>,
    locks: Arc<LockCoordinator>,
    store: Arc<dyn ConversationStore>,
    bus: Arc<EventBus>,
    answer_tier: String,
    context_turns: usize,
    lock_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        router: Arc<CollectionRouter>,
        engine: Arc<ReasoningEngine>,
        gateway: Arc<LlmGateway>,
        pipeline: Arc<ResponsePipeline>,
        locks: Arc<LockCoordinator>,
        store: Arc<dyn ConversationStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            router,
            engine,
            gateway,
            pipeline,
            locks,
            store,
            bus,
            answer_tier: "primary".into(),
            context_turns: ReasoningConfig::default().context_turns,
            lock_timeout: Duration::from_millis(LockConfig::default().default_timeout_ms),
        }
    }

    /// Which tier the final answer is synthesized on.
    pub fn with_answer_tier(mut self, tier: impl Into<String>) -> Self {
        self.answer_tier = tier.into();
        self
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Handle one query end to end.
    pub async fn handle(&self, user_id: &UserId, query: &str) -> QueryOutcome {
        self.execute(user_id, query, None).await.outcome
    }

    /// Handle one query, streaming typed events as they are produced.
    ///
    /// The receiver yields thinking, tool, and answer events live, as
    /// the reasoning loop reaches them, then metadata and a final
    /// `Done`. A hard failure ends the stream with an `Error` event and
    /// no `Done`. Dropping the receiver cancels the in-flight request:
    /// pending tool and model invocations are dropped at their next
    /// await point.
    pub fn handle_stream(
        self: Arc<Self>,
        user_id: UserId,
        query: String,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel::<StreamEvent>(128);

        tokio::spawn(async move {
            let mut gate = EventGate::new();
            let (trace_tx, mut trace_rx) = mpsc::channel::<TraceEvent>(128);
            let exec = self.execute(&user_id, &query, Some(trace_tx));
            tokio::pin!(exec);

            // Forward trace events while the request runs. The trace
            // sender lives inside `exec`, so the channel closing before
            // completion cannot happen; a closed outbound channel means
            // the client is gone and the whole execution is dropped.
            let mut trace_done = false;
            let executed = loop {
                tokio::select! {
                    executed = &mut exec => break executed,
                    event = trace_rx.recv(), if !trace_done => match event {
                        Some(event) if worth_forwarding(&event) => {
                            if !forward(&tx, &mut gate, translate(event)).await {
                                return;
                            }
                        }
                        Some(_) => {}
                        None => trace_done = true,
                    },
                    _ = tx.closed() => return,
                }
            };

            // Drain whatever the loop emitted right before finishing.
            while let Ok(event) = trace_rx.try_recv() {
                if worth_forwarding(&event) && !forward(&tx, &mut gate, translate(event)).await {
                    return;
                }
            }

            match &executed.outcome {
                QueryOutcome::Answer { text, sources, .. } => {
                    if !sources.is_empty()
                        && !forward(
                            &tx,
                            &mut gate,
                            StreamEvent::Sources {
                                sources: sources.clone(),
                            },
                        )
                        .await
                    {
                        return;
                    }
                    if !forward(&tx, &mut gate, StreamEvent::Content { text: text.clone() }).await {
                        return;
                    }
                }
                QueryOutcome::Abstain { message } => {
                    let sent = forward(
                        &tx,
                        &mut gate,
                        StreamEvent::Content {
                            text: message.clone(),
                        },
                    )
                    .await;
                    if !sent {
                        return;
                    }
                }
                QueryOutcome::Failure { message } => {
                    // Hard failures close the stream without a Done.
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: message.clone(),
                        })
                        .await;
                    return;
                }
            }

            let meta = forward(
                &tx,
                &mut gate,
                StreamEvent::Metadata {
                    steps: executed.state.steps.len(),
                    tool_calls: executed.state.tool_calls_made(),
                    evidence_score: executed.evidence_score,
                    used_tier: executed.used_tier.clone(),
                },
            )
            .await;
            if meta {
                let _ = tx.send(StreamEvent::Done).await;
            }
        });

        rx
    }

    async fn execute(
        &self,
        user_id: &UserId,
        query: &str,
        progress: Option<mpsc::Sender<TraceEvent>>,
    ) -> Executed {
        let context = self.load_context(user_id).await;
        let skip_retrieval = is_small_talk(query);
        let context_text = (!context.is_empty()).then(|| {
            context
                .iter()
                .map(|(role, content)| format!("{role}: {content}"))
                .collect::<Vec<_>>()
                .join("\n")
        });

        let routing = (!skip_retrieval).then(|| self.router.route(query, context_text.as_deref()));

        // Retrieval follows the routing decision: the primary collection,
        // its ranked fallbacks, and a concurrent fan-out across all of
        // them when the specialized detector fired.
        let target = routing.as_ref().map(|decision| SearchTarget {
            collection: decision.primary_collection.clone(),
            fallbacks: decision.fallback_chain.clone(),
            fan_out: decision.specialized_service.is_some(),
        });

        // Searches take the collection lock shared; an ingestion writer
        // holding it exclusively makes us wait. On timeout we degrade to
        // an unlocked read rather than failing the request.
        let collection_guard = match &routing {
            Some(decision) => {
                match self
                    .locks
                    .acquire_with_timeout(
                        ResourceKind::Collection,
                        &decision.primary_collection,
                        LockMode::Shared,
                        self.lock_timeout,
                    )
                    .await
                {
                    Ok(guard) => Some(guard),
                    Err(e) => {
                        warn!(error = %e, "searching without the collection lock");
                        None
                    }
                }
            }
            None => None,
        };

        let engine_outcome = match self
            .engine
            .run_traced(query, skip_retrieval, target, progress)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "reasoning failed");
                return self
                    .finish(
                        user_id,
                        query,
                        Executed {
                            outcome: QueryOutcome::Failure {
                                message: HARD_FAILURE_MESSAGE.into(),
                            },
                            state: AgentState::new(),
                            evidence_score: 0.0,
                            used_tier: None,
                        },
                    )
                    .await;
            }
        };
        drop(collection_guard);

        let executed = match engine_outcome.decision {
            Decision::Abstaining => Executed {
                outcome: QueryOutcome::Abstain {
                    message: ABSTAIN_MESSAGE.to_string(),
                },
                evidence_score: engine_outcome.evidence_score,
                state: engine_outcome.state,
                used_tier: None,
            },
            Decision::Answering => self.compose_answer(query, engine_outcome, &context).await,
        };

        self.finish(user_id, query, executed).await
    }

    /// Turn an answering decision into final text via synthesis and the
    /// response pipeline.
    async fn compose_answer(
        &self,
        query: &str,
        outcome: EngineOutcome,
        context: &[(String, String)],
    ) -> Executed {
        let mut used_tier = None;

        let text = if outcome.state.sources.is_empty() && !outcome.closing_thought.is_empty() {
            // Trusted-tool and small-talk paths: the closing thought is
            // already the answer, no grounding context to synthesize over.
            outcome.closing_thought.clone()
        } else {
            match self.synthesize(query, &outcome, context).await {
                Ok(response) => {
                    used_tier = Some(response.used_tier.clone());
                    response.text
                }
                Err(e) if !outcome.closing_thought.is_empty() => {
                    warn!(error = %e, "synthesis failed, answering with the closing thought");
                    outcome.closing_thought.clone()
                }
                Err(e) => {
                    warn!(error = %e, "synthesis failed with nothing to fall back on");
                    return Executed {
                        outcome: QueryOutcome::Failure {
                            message: HARD_FAILURE_MESSAGE.into(),
                        },
                        evidence_score: outcome.evidence_score,
                        state: outcome.state,
                        used_tier: None,
                    };
                }
            }
        };

        let draft = self
            .pipeline
            .run(Draft::new(text, outcome.state.sources.clone()))
            .await;

        Executed {
            outcome: QueryOutcome::Answer {
                text: draft.text,
                sources: draft.sources,
                used_tier: used_tier.clone(),
            },
            evidence_score: outcome.evidence_score,
            state: outcome.state,
            used_tier,
        }
    }

    async fn synthesize(
        &self,
        query: &str,
        outcome: &EngineOutcome,
        context: &[(String, String)],
    ) -> Result<GatewayResponse, clarion_core::GatewayError> {
        let mut prompt = format!(
            "Answer the user's question using only the retrieved passages below.\n\
             Cite nothing the passages do not support.\n\n\
             Passages:\n{}\n\nQuestion: {query}\n",
            outcome.state.context_text()
        );
        if !outcome.closing_thought.is_empty() {
            prompt.push_str(&format!("\nDraft answer: {}\n", outcome.closing_thought));
        }

        let mut request = TierRequest::new(prompt);
        request.context = context.to_vec();
        self.gateway.generate(&self.answer_tier, request).await
    }

    /// Recent turns for routing and tier context. Read under the shared
    /// user lock; any failure degrades to an empty context.
    async fn load_context(&self, user_id: &UserId) -> Vec<(String, String)> {
        let loaded = self
            .locks
            .with_user_lock(&user_id.0, LockMode::Shared, self.lock_timeout, || async {
                self.store.get(user_id).await
            })
            .await;

        match loaded {
            Ok(Ok(Some(conversation))) => conversation.recent_context(self.context_turns),
            Ok(Ok(None)) => Vec::new(),
            Ok(Err(e)) => {
                warn!(error = %e, "conversation load failed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "conversation read lock timed out");
                Vec::new()
            }
        }
    }

    /// Persist the exchange and publish the request outcome.
    async fn finish(&self, user_id: &UserId, query: &str, executed: Executed) -> Executed {
        self.persist(user_id, query, executed.outcome.text()).await;

        self.bus.publish(EngineEvent::RequestCompleted {
            outcome: executed.outcome.label().to_string(),
            steps: executed.state.steps.len(),
            timestamp: Utc::now(),
        });
        info!(
            outcome = executed.outcome.label(),
            steps = executed.state.steps.len(),
            evidence_score = executed.evidence_score,
            "request complete"
        );
        executed
    }

    async fn persist(&self, user_id: &UserId, query: &str, reply: &str) {
        let written = self
            .locks
            .with_user_lock(
                &user_id.0,
                LockMode::Exclusive,
                self.lock_timeout,
                || async {
                    let mut conversation = match self.store.get(user_id).await {
                        Ok(Some(conversation)) => conversation,
                        Ok(None) => Conversation::new(user_id.clone()),
                        Err(e) => {
                            warn!(error = %e, "conversation load failed, turn not persisted");
                            return;
                        }
                    };
                    conversation.push(Turn::user(query));
                    conversation.push(Turn::assistant(reply));
                    if let Err(e) = self.store.save(conversation).await {
                        warn!(error = %e, "conversation save failed");
                    }
                },
            )
            .await;

        if let Err(e) = written {
            warn!(error = %e, "conversation write lock timed out, turn not persisted");
        }
    }
}

/// An empty thought carries nothing the client can render.
fn worth_forwarding(event: &TraceEvent) -> bool {
    !matches!(event, TraceEvent::Thought { content } if content.trim().is_empty())
}

/// Map a reasoning-loop trace event onto the wire protocol.
fn translate(event: TraceEvent) -> StreamEvent {
    match event {
        TraceEvent::Thought { content } => StreamEvent::Thinking { content },
        TraceEvent::ToolCalled {
            id,
            name,
            arguments,
        } => StreamEvent::ToolCall {
            id,
            name,
            arguments,
        },
        TraceEvent::Observed {
            id,
            name,
            output,
            success,
        } => StreamEvent::Observation {
            id,
            name,
            output,
            success,
        },
    }
}

async fn forward(
    tx: &mpsc::Sender<StreamEvent>,
    gate: &mut EventGate,
    event: StreamEvent,
) -> bool {
    match gate.admit(event) {
        Ok(event) => tx.send(event).await.is_ok(),
        Err(fatal) => {
            let _ = tx
                .send(StreamEvent::Error {
                    message: fatal.to_string(),
                })
                .await;
            false
        }
    }
}

/// Greetings and pleasantries skip routing and retrieval entirely; the
/// planner answers directly.
fn is_small_talk(query: &str) -> bool {
    let normalized = query
        .trim()
        .trim_end_matches(['!', '.', '?', ','])
        .to_lowercase();
    if normalized.split_whitespace().count() > 4 {
        return false;
    }

    const GREETINGS: &[&str] = &[
        "hi",
        "hello",
        "hey",
        "good morning",
        "good afternoon",
        "good evening",
        "thanks",
        "thank you",
        "how are you",
        "bye",
        "goodbye",
    ];
    GREETINGS
        .iter()
        .any(|g| normalized == *g || normalized.starts_with(&format!("{g} ")))
}
