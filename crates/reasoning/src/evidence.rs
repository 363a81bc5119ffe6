//! Evidence scoring and the abstain policy.
//!
//! The score is a pure function of the recorded state — recomputed at
//! every policy decision, never cached. Three additive signals: one
//! source above the relevance floor, source volume above the volume
//! floor, and lexical overlap between the assembled context and the
//! query's salient terms.

use clarion_config::EvidenceConfig;
use clarion_core::{AgentState, Decision};

/// The fixed response returned instead of a generated answer when the
/// evidence gate fails.
pub const ABSTAIN_MESSAGE: &str =
    "I don't have sufficient verified information to answer this question confidently. \
     Could you rephrase it, or would you like me to connect you with the team?";

/// Compute the evidence score for the current state. Always in [0, 1].
pub fn score(query: &str, state: &AgentState, config: &EvidenceConfig) -> f32 {
    let mut score = 0.0;

    if state
        .sources
        .iter()
        .any(|s| s.score > config.relevance_floor)
    {
        score += config.relevance_weight;
    }

    if state.sources.len() > config.volume_floor {
        score += config.volume_weight;
    }

    if has_lexical_overlap(query, &state.context_text()) {
        score += config.overlap_weight;
    }

    score.min(1.0)
}

/// Apply the abstain policy.
///
/// A trusted tool success bypasses the numeric gate unconditionally;
/// so does an explicit skip-retrieval decision (small talk, meta
/// questions). Otherwise a score below the floor abstains.
pub fn decide(score: f32, state: &AgentState, config: &EvidenceConfig) -> Decision {
    if state.has_trusted_success() {
        return Decision::Answering;
    }
    if state.skip_retrieval {
        return Decision::Answering;
    }
    if score < config.abstain_floor {
        Decision::Abstaining
    } else {
        Decision::Answering
    }
}

/// Salient terms of the query: lowercased alphanumeric words longer
/// than three characters, minus a tiny stopword list.
fn salient_terms(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "what", "when", "where", "which", "does", "about", "with", "this", "that", "have",
        "from", "your", "their", "will", "would", "should", "could",
    ];
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// True when at least a third of the query's salient terms appear in
/// the assembled context.
fn has_lexical_overlap(query: &str, context: &str) -> bool {
    let terms = salient_terms(query);
    if terms.is_empty() || context.is_empty() {
        return false;
    }
    let context = context.to_lowercase();
    let hits = terms.iter().filter(|t| context.contains(t.as_str())).count();
    hits * 3 >= terms.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarion_core::{Observation, RetrievedSource, Step, ToolKind};

    fn source(score: f32, snippet: &str) -> RetrievedSource {
        RetrievedSource {
            id: "s".into(),
            collection: "visa_kb".into(),
            score,
            snippet: snippet.into(),
            reference: None,
        }
    }

    fn config() -> EvidenceConfig {
        EvidenceConfig::default()
    }

    #[test]
    fn empty_state_scores_zero() {
        let state = AgentState::new();
        assert_eq!(score("What is KITAS?", &state, &config()), 0.0);
    }

    #[test]
    fn strong_retrieval_scores_above_answering_floor() {
        // Five relevant sources mentioning the query term: all three
        // signals fire.
        let mut state = AgentState::new();
        state.add_sources((0..5).map(|i| {
            source(
                0.85,
                &format!("KITAS detail {i}: a limited stay permit for foreigners"),
            )
        }));
        let s = score("What is KITAS?", &state, &config());
        assert!(s >= 0.8, "expected >= 0.8, got {s}");
        assert_eq!(decide(s, &state, &config()), Decision::Answering);
    }

    #[test]
    fn no_sources_abstains() {
        let state = AgentState::new();
        let s = score("What are visa rules in Antarctica?", &state, &config());
        assert_eq!(s, 0.0);
        assert_eq!(decide(s, &state, &config()), Decision::Abstaining);
    }

    #[test]
    fn score_is_monotone_in_signals() {
        let cfg = config();
        let query = "KITAS sponsorship requirements";

        let mut weak = AgentState::new();
        weak.add_sources([source(0.1, "unrelated text")]);

        let mut strong = AgentState::new();
        strong.add_sources((0..4).map(|_| source(0.9, "KITAS sponsorship requirements detail")));

        assert!(score(query, &strong, &cfg) >= score(query, &weak, &cfg));
    }

    #[test]
    fn score_never_exceeds_one() {
        let mut cfg = config();
        cfg.relevance_weight = 0.6;
        cfg.volume_weight = 0.4;
        cfg.overlap_weight = 0.4;

        let mut state = AgentState::new();
        state.add_sources((0..6).map(|_| source(0.95, "KITAS permit sponsorship")));
        let s = score("KITAS permit sponsorship", &state, &cfg);
        assert!(s <= 1.0);
    }

    #[test]
    fn trusted_success_bypasses_zero_score() {
        let mut state = AgentState::new();
        state.push_step(Step {
            thought: "compute the tax".into(),
            actions: vec![],
            observations: vec![Observation::ok(ToolKind::Calculator, "110000000")],
        });

        let s = score("What is 22% tax on 500,000,000?", &state, &config());
        assert_eq!(s, 0.0);
        assert_eq!(decide(s, &state, &config()), Decision::Answering);
    }

    #[test]
    fn failed_trusted_tool_does_not_bypass() {
        let mut state = AgentState::new();
        state.push_step(Step {
            thought: "compute".into(),
            actions: vec![],
            observations: vec![Observation::error(ToolKind::Calculator, "division by zero")],
        });
        assert_eq!(decide(0.0, &state, &config()), Decision::Abstaining);
    }

    #[test]
    fn skip_retrieval_answers_without_evidence() {
        let mut state = AgentState::new();
        state.skip_retrieval = true;
        assert_eq!(decide(0.0, &state, &config()), Decision::Answering);
    }

    #[test]
    fn overlap_requires_salient_terms_in_context() {
        let mut state = AgentState::new();
        state.add_sources([source(0.1, "KITAS sponsorship rules for spouses")]);
        // Relevance floor not cleared (0.1), volume floor not cleared,
        // but the context shares the salient terms.
        let s = score("KITAS sponsorship", &state, &config());
        assert_eq!(s, config().overlap_weight);
    }
}
