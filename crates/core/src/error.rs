//! Error types for the Clarion domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and every failure
//! carries a classification (`ErrorClass`) that retry and fallback
//! logic keys off — the retry decision is a pure function of the
//! classified result.

use thiserror::Error;

/// The top-level error type for all Clarion operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Vector store errors ---
    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    // --- Gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Lock errors ---
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    // --- Conversation memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure should be treated by retry/fallback logic.
///
/// Policy outcomes (evidence insufficient → abstain) are deliberately
/// not errors and have no class here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network timeout, connection reset, 5xx, lock timeout.
    /// Eligible for bounded retry or tier fallback.
    Transient,
    /// Malformed request, 4xx other than 429. Surfaced immediately.
    Permanent,
    /// Rate limit (429). Transient, but with a longer backoff.
    Capacity,
}

// --- Bounded context errors ---

/// Failures talking to the vector store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Rate limited by store, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Bad request {status}: {message}")]
    BadRequest { status: u16, message: String },

    #[error("Collection not found: {0}")]
    CollectionMissing(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl StoreError {
    /// Classify this failure for the retry loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::Server { .. } => ErrorClass::Transient,
            Self::RateLimited { .. } => ErrorClass::Capacity,
            Self::BadRequest { .. } | Self::CollectionMissing(_) | Self::MalformedResponse(_) => {
                ErrorClass::Permanent
            }
        }
    }

    /// Whether the retry loop may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.class(), ErrorClass::Permanent)
    }
}

/// Failures invoking a model tier or running the cascade.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Tier invocation failed: {tier} — {message}")]
    Invocation { tier: String, message: String },

    #[error("Tier rate limited: {tier}, retry after {retry_after_secs}s")]
    RateLimited { tier: String, retry_after_secs: u64 },

    #[error("Tier timed out: {tier} after {timeout_secs}s")]
    Timeout { tier: String, timeout_secs: u64 },

    #[error("Circuit open for tier: {0}")]
    CircuitOpen(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("All models failed after {attempts} attempts")]
    AllTiersFailed { attempts: usize },

    #[error("Fallback cost cap exceeded: spent ${spent_usd:.4}, cap ${cap_usd:.4}")]
    CostCapExceeded { spent_usd: f64, cap_usd: f64 },
}

impl GatewayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Invocation { .. } | Self::Timeout { .. } | Self::CircuitOpen(_) => {
                ErrorClass::Transient
            }
            Self::RateLimited { .. } => ErrorClass::Capacity,
            Self::UnknownTier(_) | Self::AllTiersFailed { .. } | Self::CostCapExceeded { .. } => {
                ErrorClass::Permanent
            }
        }
    }
}

/// Failures executing a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

/// Failures acquiring a coordinated lock.
///
/// A lock timeout is always recoverable: the calling stage decides to
/// retry, degrade, or fail the request. It must never be swallowed.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Lock timed out: {resource} after {timeout_ms}ms")]
    Timeout { resource: String, timeout_ms: u64 },

    #[error("Lock coordinator shut down while waiting for {resource}")]
    Closed { resource: String },
}

impl LockError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Transient
    }
}

/// Failures reading or writing conversational memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found for user: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_timeout_is_transient() {
        let err = StoreError::Timeout("search".into());
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn store_rate_limit_is_capacity() {
        let err = StoreError::RateLimited {
            retry_after_secs: 5,
        };
        assert_eq!(err.class(), ErrorClass::Capacity);
        assert!(err.is_retryable());
    }

    #[test]
    fn store_bad_request_is_permanent() {
        let err = StoreError::BadRequest {
            status: 400,
            message: "missing vector".into(),
        };
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert!(!err.is_retryable());
    }

    #[test]
    fn gateway_cost_cap_is_permanent() {
        let err = GatewayError::CostCapExceeded {
            spent_usd: 0.61,
            cap_usd: 0.50,
        };
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert!(err.to_string().contains("0.50"));
    }

    #[test]
    fn lock_timeout_is_transient() {
        let err = LockError::Timeout {
            resource: "user_memory:u1".into(),
            timeout_ms: 5000,
        };
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.to_string().contains("u1"));
    }

    #[test]
    fn top_level_error_wraps_contexts() {
        let err: Error = StoreError::Connection("reset".into()).into();
        assert!(err.to_string().contains("reset"));

        let err: Error = GatewayError::AllTiersFailed { attempts: 3 }.into();
        assert!(err.to_string().contains("All models failed"));
    }
}
