//! Configuration loading and validation for the Clarion engine.
//!
//! Loads configuration from `~/.clarion/config.toml` with environment
//! variable overrides. Every tuning constant the engine depends on —
//! evidence weights and floors, breaker thresholds, cascade caps, retry
//! policy, lock timeouts — lives here as a named, serde-defaulted
//! field. These values were calibrated against real incidents; change
//! them deliberately, with the regression tests that encode those
//! incidents.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// The root configuration structure.
///
/// Maps directly to `~/.clarion/config.toml`.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Vector store API key (overridable via `CLARION_STORE_API_KEY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_api_key: Option<String>,

    /// Evidence scoring policy.
    #[serde(default)]
    pub evidence: EvidenceConfig,

    /// Circuit breaker policy, applied per tier.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Cascade (tier fallback) caps.
    #[serde(default)]
    pub cascade: CascadeConfig,

    /// Vector store retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Lock coordinator policy.
    #[serde(default)]
    pub locks: LockConfig,

    /// Collection routing.
    #[serde(default)]
    pub router: RouterConfig,

    /// Reasoning loop bounds.
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Vector store transport.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Evidence score weights and floors.
///
/// The three weights and the relevance floor came out of incident-fix
/// history rather than derivation; they are configurable pending
/// further calibration data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Added when at least one source clears the relevance floor.
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f32,

    /// Added when the source count clears the volume floor.
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f32,

    /// Added when the assembled context shares salient query terms.
    #[serde(default = "default_overlap_weight")]
    pub overlap_weight: f32,

    /// Minimum per-source relevance score that counts as a hit.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,

    /// Source count above which the volume bonus applies.
    #[serde(default = "default_volume_floor")]
    pub volume_floor: usize,

    /// Final score below which the engine abstains (absent a trusted
    /// tool success). Was 0.8 before the over-abstain incident.
    #[serde(default = "default_abstain_floor")]
    pub abstain_floor: f32,
}

fn default_relevance_weight() -> f32 {
    0.5
}
fn default_volume_weight() -> f32 {
    0.2
}
fn default_overlap_weight() -> f32 {
    0.3
}
fn default_relevance_floor() -> f32 {
    0.3
}
fn default_volume_floor() -> usize {
    3
}
fn default_abstain_floor() -> f32 {
    0.3
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            volume_weight: default_volume_weight(),
            overlap_weight: default_overlap_weight(),
            relevance_floor: default_relevance_floor(),
            volume_floor: default_volume_floor(),
            abstain_floor: default_abstain_floor(),
        }
    }
}

/// Per-tier circuit breaker policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures within the window that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Failure observation window.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How long an open breaker waits before permitting a trial.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    60
}
fn default_cooldown_secs() -> u64 {
    30
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Hard caps on the tier fallback cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Maximum tiers tried per request.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum estimated spend across fallback attempts per request.
    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,

    /// Per-invocation timeout.
    #[serde(default = "default_tier_timeout_secs")]
    pub tier_timeout_secs: u64,
}

fn default_max_depth() -> usize {
    3
}
fn default_max_cost_usd() -> f64 {
    0.50
}
fn default_tier_timeout_secs() -> u64 {
    60
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_cost_usd: default_max_cost_usd(),
            tier_timeout_secs: default_tier_timeout_secs(),
        }
    }
}

/// Vector store retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt cap, including the first try.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff for transient failures; doubles per attempt.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff applied to capacity (429) failures.
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    200
}
fn default_rate_limit_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
        }
    }
}

/// Lock coordinator policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Default acquisition timeout.
    #[serde(default = "default_lock_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// One routable collection and its keyword index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name in the vector store.
    pub name: String,

    /// Keywords that vote for this collection.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Operator-configured patterns that force this collection
    /// regardless of keyword score.
    #[serde(default)]
    pub priority_patterns: Vec<String>,
}

/// A specialized composite service and its trigger patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecializedServiceConfig {
    /// Service identifier (e.g. "cross_collection_synthesis").
    pub service: String,

    /// Query substrings that route to this service.
    pub patterns: Vec<String>,
}

/// Collection routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Below this confidence the full ranked fallback chain is attached.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,

    /// Collection used when metadata is unavailable or nothing matches.
    #[serde(default = "default_collection")]
    pub default_collection: String,

    /// Routable collections.
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,

    /// Specialized service detectors.
    #[serde(default)]
    pub specialized: Vec<SpecializedServiceConfig>,
}

fn default_confidence_floor() -> f32 {
    0.4
}
fn default_collection() -> String {
    "general_kb".into()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
            default_collection: default_collection(),
            collections: Vec::new(),
            specialized: Vec::new(),
        }
    }
}

/// Reasoning loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Maximum Thought → Action → Observation iterations per request.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Conversation turns included as tier context.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

fn default_max_steps() -> u32 {
    6
}
fn default_context_turns() -> usize {
    10
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            context_turns: default_context_turns(),
        }
    }
}

/// Vector store transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the vector store HTTP API.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Per-request timeout.
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,

    /// Default result limit for searches.
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

fn default_store_url() -> String {
    "http://localhost:6333".into()
}
fn default_store_timeout_secs() -> u64 {
    10
}
fn default_search_limit() -> usize {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_secs: default_store_timeout_secs(),
            default_limit: default_search_limit(),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field(
                "store_api_key",
                &self.store_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("evidence", &self.evidence)
            .field("breaker", &self.breaker)
            .field("cascade", &self.cascade)
            .field("retry", &self.retry)
            .field("locks", &self.locks)
            .field("router", &self.router)
            .field("reasoning", &self.reasoning)
            .field("store", &self.store)
            .finish()
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.clarion/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `CLARION_STORE_API_KEY`
    /// - `CLARION_STORE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.store_api_key.is_none() {
            config.store_api_key = std::env::var("CLARION_STORE_API_KEY").ok();
        }

        if let Ok(url) = std::env::var("CLARION_STORE_URL") {
            config.store.url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clarion")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.evidence;
        let weight_sum = e.relevance_weight + e.volume_weight + e.overlap_weight;
        if !(0.0..=1.0).contains(&weight_sum) {
            return Err(ConfigError::ValidationError(
                "evidence weights must sum to at most 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&e.abstain_floor) {
            return Err(ConfigError::ValidationError(
                "evidence.abstain_floor must be in [0.0, 1.0]".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.cascade.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "cascade.max_depth must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_incident_calibration() {
        let config = EngineConfig::default();
        assert!((config.evidence.relevance_weight - 0.5).abs() < f32::EPSILON);
        assert!((config.evidence.volume_weight - 0.2).abs() < f32::EPSILON);
        assert!((config.evidence.overlap_weight - 0.3).abs() < f32::EPSILON);
        assert!((config.evidence.abstain_floor - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.evidence.volume_floor, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.cascade.max_depth, 3);
        assert!((config.cascade.max_cost_usd - 0.50).abs() < f64::EPSILON);
        assert_eq!(config.locks.default_timeout_ms, 5000);
    }

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            [evidence]
            abstain_floor = 0.25

            [[router.collections]]
            name = "visa_kb"
            keywords = ["kitas", "visa", "immigration"]
        "#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert!((config.evidence.abstain_floor - 0.25).abs() < f32::EPSILON);
        assert!((config.evidence.relevance_weight - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.router.collections.len(), 1);
        assert_eq!(config.router.collections[0].name, "visa_kb");
    }

    #[test]
    fn invalid_abstain_floor_rejected() {
        let mut config = EngineConfig::default();
        config.evidence.abstain_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cascade_depth_rejected() {
        let mut config = EngineConfig::default();
        config.cascade.max_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = EngineConfig {
            store_api_key: Some("secret-key".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.router.default_collection, "general_kb");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [cascade]
            max_cost_usd = 0.25

            [store]
            url = "http://vectors.internal:6333"
            "#,
        )
        .unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert!((config.cascade.max_cost_usd - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.store.url, "http://vectors.internal:6333");
    }
}
