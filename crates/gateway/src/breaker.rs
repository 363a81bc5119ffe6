//! Per-tier circuit breaker.
//!
//! Closed → Open after enough failures inside the observation window.
//! Open → HalfOpen once the cooldown elapses, admitting exactly one
//! trial invocation; concurrent requests during the trial are turned
//! away so they fail over to the next tier instead of piling on. A
//! trial success closes the breaker, a trial failure reopens it, and a
//! trial whose caller disappears mid-flight (the invoking future was
//! dropped) reopens it via the [`TrialToken`] drop guard — the breaker
//! can never be left HalfOpen with a phantom trial in flight.
//!
//! Uses `tokio::time::Instant` throughout so tests can drive the clock.

use clarion_config::BreakerConfig;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn name(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// A state change, reported so the gateway can publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

struct Inner {
    state: BreakerState,
    /// Failure timestamps inside the observation window.
    failures: VecDeque<Instant>,
    opened_at: Instant,
    trial_in_flight: bool,
    /// Bumped per admitted trial so a stale token cannot settle a
    /// later one.
    trial_seq: u64,
}

/// Guard for an admitted half-open trial.
///
/// The trial settles through `record_success` or `record_failure`; if
/// neither runs — the invocation future was cancelled mid-flight —
/// dropping the token reopens the breaker and restarts the cooldown,
/// so the single-trial slot is never wedged.
pub struct TrialToken {
    tier: String,
    inner: Arc<Mutex<Inner>>,
    seq: u64,
}

impl Drop for TrialToken {
    fn drop(&mut self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.state == BreakerState::HalfOpen
            && inner.trial_in_flight
            && inner.trial_seq == self.seq
        {
            inner.state = BreakerState::Open;
            inner.opened_at = Instant::now();
            inner.trial_in_flight = false;
            debug!(tier = %self.tier, "trial abandoned mid-flight, breaker reopened");
        }
    }
}

pub struct CircuitBreaker {
    tier: String,
    config: BreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(tier: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            tier: tier.into(),
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: Instant::now(),
                trial_in_flight: false,
                trial_seq: 0,
            })),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Ask for permission to invoke the tier.
    ///
    /// Returns `(allowed, transition, trial)`. An Open breaker whose
    /// cooldown has elapsed moves to HalfOpen and admits the caller as
    /// the single trial, handing back a [`TrialToken`] the caller must
    /// hold across the invocation; everyone else is refused until the
    /// trial settles.
    pub fn try_acquire(&self) -> (bool, Option<Transition>, Option<TrialToken>) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => (true, None, None),
            BreakerState::Open => {
                let cooldown = Duration::from_secs(self.config.cooldown_secs);
                if inner.opened_at.elapsed() >= cooldown {
                    inner.state = BreakerState::HalfOpen;
                    let token = self.admit_trial(&mut inner);
                    info!(tier = %self.tier, "breaker cooldown elapsed, admitting trial");
                    (
                        true,
                        Some(Transition {
                            from: BreakerState::Open,
                            to: BreakerState::HalfOpen,
                        }),
                        Some(token),
                    )
                } else {
                    (false, None, None)
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    (false, None, None)
                } else {
                    let token = self.admit_trial(&mut inner);
                    (true, None, Some(token))
                }
            }
        }
    }

    fn admit_trial(&self, inner: &mut MutexGuard<'_, Inner>) -> TrialToken {
        inner.trial_in_flight = true;
        inner.trial_seq += 1;
        TrialToken {
            tier: self.tier.clone(),
            inner: Arc::clone(&self.inner),
            seq: inner.trial_seq,
        }
    }

    pub fn record_success(&self) -> Option<Transition> {
        let mut inner = self.lock();
        inner.failures.clear();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.trial_in_flight = false;
                info!(tier = %self.tier, "trial succeeded, breaker closed");
                Some(Transition {
                    from: BreakerState::HalfOpen,
                    to: BreakerState::Closed,
                })
            }
            _ => None,
        }
    }

    pub fn record_failure(&self) -> Option<Transition> {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = now;
                inner.trial_in_flight = false;
                inner.failures.clear();
                info!(tier = %self.tier, "trial failed, breaker reopened");
                Some(Transition {
                    from: BreakerState::HalfOpen,
                    to: BreakerState::Open,
                })
            }
            BreakerState::Closed => {
                let window = Duration::from_secs(self.config.window_secs);
                inner.failures.push_back(now);
                while let Some(front) = inner.failures.front() {
                    if now.duration_since(*front) > window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = now;
                    info!(
                        tier = %self.tier,
                        failures = inner.failures.len(),
                        "failure threshold crossed, breaker opened"
                    );
                    Some(Transition {
                        from: BreakerState::Closed,
                        to: BreakerState::Open,
                    })
                } else {
                    None
                }
            }
            BreakerState::Open => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Mutex poisoning cannot happen: no code panics while holding it.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
