//! The reasoning engine: ReAct loop, evidence scoring, abstain policy.
//!
//! The loop's policy decisions (answer vs. abstain) are deliberately
//! separate from model quality: they are pure functions over the
//! recorded trace, so the gate behaves identically whichever tier
//! produced the steps.

pub mod engine;
pub mod evidence;
pub mod planner;

pub use engine::{EngineOutcome, ReasoningEngine, TraceEvent};
pub use evidence::ABSTAIN_MESSAGE;
pub use planner::{Planner, PlannerAction, TierPlanner, parse_action};
