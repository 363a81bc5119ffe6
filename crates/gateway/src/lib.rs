//! Multi-tier LLM gateway.
//!
//! Tiers are ordered by capability and cost. A request names its
//! starting tier; on failure the gateway cascades down the order,
//! skipping tiers whose circuit breaker is open, bounded by a fallback
//! depth cap and a cumulative cost cap. Usage, latency and breaker
//! transitions are reported on the event bus.

pub mod breaker;
pub mod pricing;

use chrono::Utc;
use clarion_config::{BreakerConfig, CascadeConfig};
use clarion_core::{EngineEvent, EventBus, GatewayError, ModelBackend, TierRequest, Usage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use breaker::{BreakerState, CircuitBreaker, Transition, TrialToken};
pub use pricing::{ModelPricing, PricingTable};

/// The result of a successful cascade.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub text: String,
    pub used_tier: String,
    pub usage: Usage,
}

pub struct LlmGateway {
    tiers: Vec<Arc<dyn ModelBackend>>,
    breakers: HashMap<String, CircuitBreaker>,
    breaker_config: BreakerConfig,
    pricing: PricingTable,
    cascade: CascadeConfig,
    bus: Arc<EventBus>,
}

impl LlmGateway {
    pub fn new(cascade: CascadeConfig, breaker_config: BreakerConfig, bus: Arc<EventBus>) -> Self {
        Self {
            tiers: Vec::new(),
            breakers: HashMap::new(),
            breaker_config,
            pricing: PricingTable::with_defaults(),
            cascade,
            bus,
        }
    }

    /// Add a tier to the end of the cascade order.
    pub fn with_tier(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        let tier_id = backend.tier_id().to_string();
        self.breakers.insert(
            tier_id.clone(),
            CircuitBreaker::new(tier_id, self.breaker_config.clone()),
        );
        self.tiers.push(backend);
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Breaker state for a tier, for inspection.
    pub fn breaker_state(&self, tier: &str) -> Option<BreakerState> {
        self.breakers.get(tier).map(|b| b.state())
    }

    /// Run the cascade starting at `tier`.
    pub async fn generate(
        &self,
        tier: &str,
        request: TierRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let start = self
            .tiers
            .iter()
            .position(|t| t.tier_id() == tier)
            .ok_or_else(|| GatewayError::UnknownTier(tier.to_string()))?;

        let mut attempts = 0usize;
        let mut spent_usd = 0.0f64;
        let mut last_error: Option<GatewayError> = None;

        for backend in &self.tiers[start..] {
            if attempts >= self.cascade.max_depth {
                warn!(depth = attempts, "fallback depth cap reached");
                break;
            }

            let tier_id = backend.tier_id();
            // Tiers added via with_tier always have a breaker.
            let Some(breaker) = self.breakers.get(tier_id) else {
                continue;
            };

            // A half-open trial token settles the breaker if this future
            // is dropped before the invocation reports an outcome.
            let (allowed, transition, _trial) = breaker.try_acquire();
            self.publish_transition(tier_id, transition);
            if !allowed {
                debug!(tier = tier_id, "breaker open, skipping to next tier");
                last_error = Some(GatewayError::CircuitOpen(tier_id.to_string()));
                continue;
            }

            attempts += 1;
            let started = Instant::now();
            let timeout = Duration::from_secs(self.cascade.tier_timeout_secs);

            let outcome = tokio::time::timeout(timeout, backend.invoke(request.clone())).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(Ok(response)) => {
                    let transition = breaker.record_success();
                    self.publish_transition(tier_id, transition);
                    let cost_usd = self.pricing.cost(
                        backend.model(),
                        response.usage.prompt_tokens,
                        response.usage.completion_tokens,
                    );
                    self.bus.publish(EngineEvent::TierInvoked {
                        tier: tier_id.to_string(),
                        model: backend.model().to_string(),
                        prompt_tokens: response.usage.prompt_tokens,
                        completion_tokens: response.usage.completion_tokens,
                        cost_usd,
                        duration_ms,
                        success: true,
                        timestamp: Utc::now(),
                    });
                    return Ok(GatewayResponse {
                        text: response.text,
                        used_tier: tier_id.to_string(),
                        usage: response.usage,
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Timeout {
                    tier: tier_id.to_string(),
                    timeout_secs: self.cascade.tier_timeout_secs,
                },
            };

            let transition = breaker.record_failure();
            self.publish_transition(tier_id, transition);

            // Failed attempts still consumed prompt tokens; estimate
            // them so the cost cap binds across the whole cascade.
            let est_prompt = PricingTable::estimate_prompt_tokens(request.prompt.len());
            spent_usd += self.pricing.cost(backend.model(), est_prompt, 0);

            self.bus.publish(EngineEvent::TierInvoked {
                tier: tier_id.to_string(),
                model: backend.model().to_string(),
                prompt_tokens: est_prompt,
                completion_tokens: 0,
                cost_usd: spent_usd,
                duration_ms,
                success: false,
                timestamp: Utc::now(),
            });
            warn!(tier = tier_id, error = %error, "tier invocation failed, cascading");
            last_error = Some(error);

            if spent_usd > self.cascade.max_cost_usd {
                return Err(GatewayError::CostCapExceeded {
                    spent_usd,
                    cap_usd: self.cascade.max_cost_usd,
                });
            }
        }

        if let Some(e) = last_error {
            warn!(attempts, last_error = %e, "cascade exhausted");
        }
        Err(GatewayError::AllTiersFailed { attempts })
    }

    fn publish_transition(&self, tier: &str, transition: Option<Transition>) {
        if let Some(t) = transition {
            self.bus.publish(EngineEvent::BreakerTransition {
                tier: tier.to_string(),
                from: t.from.name().to_string(),
                to: t.to.name().to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clarion_core::TierResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that plays back a scripted sequence of outcomes.
    struct ScriptedBackend {
        tier: String,
        model: String,
        script: Mutex<VecDeque<Result<String, GatewayError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(tier: &str, script: Vec<Result<String, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                tier: tier.into(),
                model: format!("test/{tier}"),
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn failure(tier: &str) -> GatewayError {
            GatewayError::Invocation {
                tier: tier.into(),
                message: "boom".into(),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn tier_id(&self) -> &str {
            &self.tier
        }

        fn model(&self) -> &str {
            &self.model
        }

        async fn invoke(&self, _request: TierRequest) -> Result<TierResponse, GatewayError> {
            *self.calls.lock().unwrap() += 1;
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(Self::failure(&self.tier)));
            next.map(|text| TierResponse {
                text,
                usage: Usage::new(100, 50),
                model: self.model.clone(),
            })
        }
    }

    fn test_gateway(tiers: Vec<Arc<ScriptedBackend>>) -> LlmGateway {
        let mut gateway = LlmGateway::new(
            CascadeConfig {
                max_depth: 3,
                max_cost_usd: 0.50,
                tier_timeout_secs: 5,
            },
            BreakerConfig {
                failure_threshold: 5,
                window_secs: 60,
                cooldown_secs: 30,
            },
            Arc::new(EventBus::default()),
        );
        for tier in tiers {
            gateway = gateway.with_tier(tier);
        }
        gateway
    }

    #[tokio::test]
    async fn first_tier_success_stops_the_cascade() {
        let primary = ScriptedBackend::new("primary", vec![Ok("answer".into())]);
        let fallback = ScriptedBackend::new("fallback", vec![Ok("unused".into())]);
        let gateway = test_gateway(vec![primary.clone(), fallback.clone()]);

        let response = gateway
            .generate("primary", TierRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(response.text, "answer");
        assert_eq!(response.used_tier, "primary");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn failure_cascades_to_next_tier() {
        let primary = ScriptedBackend::new("primary", vec![Err(ScriptedBackend::failure("primary"))]);
        let fallback = ScriptedBackend::new("fallback", vec![Ok("rescued".into())]);
        let gateway = test_gateway(vec![primary.clone(), fallback.clone()]);

        let response = gateway
            .generate("primary", TierRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(response.used_tier, "fallback");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_tier_is_rejected() {
        let gateway = test_gateway(vec![ScriptedBackend::new("primary", vec![])]);
        let err = gateway
            .generate("nope", TierRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTier(_)));
    }

    #[tokio::test]
    async fn all_tiers_failing_is_a_hard_failure() {
        let primary = ScriptedBackend::new("primary", vec![]);
        let fallback = ScriptedBackend::new("fallback", vec![]);
        let gateway = test_gateway(vec![primary, fallback]);

        let err = gateway
            .generate("primary", TierRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllTiersFailed { attempts: 2 }));
    }

    #[tokio::test]
    async fn depth_cap_bounds_the_cascade() {
        let tiers: Vec<_> = ["t1", "t2", "t3", "t4"]
            .iter()
            .map(|t| ScriptedBackend::new(t, vec![]))
            .collect();
        let gateway = test_gateway(tiers.clone());

        let err = gateway
            .generate("t1", TierRequest::new("hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::AllTiersFailed { attempts: 3 }));
        // The fourth tier is never reached.
        assert_eq!(tiers[3].calls(), 0);
    }

    #[tokio::test]
    async fn open_breaker_skips_straight_to_fallback() {
        let primary = ScriptedBackend::new("primary", vec![]);
        let fallback = ScriptedBackend::new(
            "fallback",
            vec![Ok("a".into()), Ok("b".into()), Ok("c".into()), Ok("d".into()), Ok("e".into()), Ok("f".into())],
        );
        let gateway = test_gateway(vec![primary.clone(), fallback.clone()]);

        // Five failing requests open the primary breaker.
        for _ in 0..5 {
            let _ = gateway.generate("primary", TierRequest::new("q")).await;
        }
        assert_eq!(gateway.breaker_state("primary"), Some(BreakerState::Open));
        assert_eq!(primary.calls(), 5);

        // The next request never touches the primary.
        let response = gateway
            .generate("primary", TierRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(response.used_tier, "fallback");
        assert_eq!(primary.calls(), 5);
    }

    #[tokio::test]
    async fn cost_cap_aborts_the_cascade() {
        let primary = ScriptedBackend::new("expensive", vec![]);
        let fallback = ScriptedBackend::new("fallback", vec![Ok("unreachable".into())]);
        let mut gateway = test_gateway(vec![primary, fallback.clone()]);
        gateway.cascade.max_cost_usd = 0.000001;
        gateway
            .pricing
            .set("test/expensive", ModelPricing::new(1000.0, 1000.0));

        let err = gateway
            .generate("expensive", TierRequest::new("a long prompt about visas"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CostCapExceeded { .. }));
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tier_timeout_cascades() {
        struct HangingBackend;

        #[async_trait]
        impl ModelBackend for HangingBackend {
            fn tier_id(&self) -> &str {
                "hanging"
            }
            fn model(&self) -> &str {
                "test/hanging"
            }
            async fn invoke(&self, _request: TierRequest) -> Result<TierResponse, GatewayError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }

        let fallback = ScriptedBackend::new("fallback", vec![Ok("rescued".into())]);
        let mut gateway = LlmGateway::new(
            CascadeConfig {
                max_depth: 3,
                max_cost_usd: 0.50,
                tier_timeout_secs: 1,
            },
            BreakerConfig::default(),
            Arc::new(EventBus::default()),
        );
        gateway = gateway.with_tier(Arc::new(HangingBackend)).with_tier(fallback);

        let response = gateway
            .generate("hanging", TierRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(response.used_tier, "fallback");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trial_does_not_wedge_the_tier() {
        /// Fails three times, hangs on the fourth call, recovers after.
        struct FlakyBackend {
            calls: Mutex<usize>,
        }

        #[async_trait]
        impl ModelBackend for FlakyBackend {
            fn tier_id(&self) -> &str {
                "primary"
            }
            fn model(&self) -> &str {
                "test/flaky"
            }
            async fn invoke(&self, _request: TierRequest) -> Result<TierResponse, GatewayError> {
                let call = {
                    let mut calls = self.calls.lock().unwrap();
                    *calls += 1;
                    *calls
                };
                match call {
                    1..=3 => Err(GatewayError::Invocation {
                        tier: "primary".into(),
                        message: "boom".into(),
                    }),
                    4 => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        unreachable!()
                    }
                    _ => Ok(TierResponse {
                        text: "recovered".into(),
                        usage: Usage::new(100, 50),
                        model: "test/flaky".into(),
                    }),
                }
            }
        }

        let gateway = LlmGateway::new(
            CascadeConfig {
                max_depth: 1,
                max_cost_usd: 0.50,
                tier_timeout_secs: 7200,
            },
            BreakerConfig {
                failure_threshold: 3,
                window_secs: 60,
                cooldown_secs: 30,
            },
            Arc::new(EventBus::default()),
        )
        .with_tier(Arc::new(FlakyBackend {
            calls: Mutex::new(0),
        }));

        // Three failures open the breaker.
        for _ in 0..3 {
            let _ = gateway.generate("primary", TierRequest::new("q")).await;
        }
        assert_eq!(gateway.breaker_state("primary"), Some(BreakerState::Open));

        // Cooldown elapses; the admitted trial hangs and the caller
        // gives up, dropping the whole generate future mid-invoke.
        tokio::time::advance(Duration::from_secs(31)).await;
        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            gateway.generate("primary", TierRequest::new("q")),
        )
        .await;
        assert!(abandoned.is_err());

        // The trial settled on drop: Open again, not wedged HalfOpen.
        assert_eq!(gateway.breaker_state("primary"), Some(BreakerState::Open));

        // After the next cooldown the tier is reachable and recovers.
        tokio::time::advance(Duration::from_secs(31)).await;
        let response = gateway
            .generate("primary", TierRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(response.text, "recovered");
        assert_eq!(
            gateway.breaker_state("primary"),
            Some(BreakerState::Closed)
        );
    }

    #[tokio::test]
    async fn breaker_events_are_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let primary = ScriptedBackend::new("primary", vec![]);
        let mut gateway = LlmGateway::new(
            CascadeConfig {
                max_depth: 1,
                max_cost_usd: 0.50,
                tier_timeout_secs: 5,
            },
            BreakerConfig {
                failure_threshold: 1,
                window_secs: 60,
                cooldown_secs: 30,
            },
            bus,
        );
        gateway = gateway.with_tier(primary);

        let _ = gateway.generate("primary", TierRequest::new("q")).await;

        let mut saw_transition = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), EngineEvent::BreakerTransition { to, .. } if to == "open") {
                saw_transition = true;
            }
        }
        assert!(saw_transition);
    }
}
