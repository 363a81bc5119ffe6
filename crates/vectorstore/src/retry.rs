//! Classified retry with bounded exponential backoff.
//!
//! Every transport failure is classified (`ErrorClass`) before any
//! retry decision is made. The backoff schedule is a pure function of
//! the class and the attempt number, so the policy is testable without
//! triggering real failures.

use clarion_config::RetryConfig;
use clarion_core::{ErrorClass, StoreError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Compute the delay before the next attempt, or `None` when the
/// failure must not be retried.
///
/// `attempt` is 1-based (the attempt that just failed). Transient
/// failures back off exponentially from the base; capacity failures
/// (429) use the longer rate-limit backoff, scaled linearly.
pub fn backoff_delay(class: ErrorClass, attempt: u32, policy: &RetryConfig) -> Option<Duration> {
    match class {
        ErrorClass::Permanent => None,
        ErrorClass::Transient => Some(Duration::from_millis(
            policy.base_backoff_ms.saturating_mul(1 << (attempt - 1).min(16)),
        )),
        ErrorClass::Capacity => Some(Duration::from_millis(
            policy.rate_limit_backoff_ms.saturating_mul(attempt as u64),
        )),
    }
}

/// Run `op` up to `policy.max_attempts` times.
///
/// Non-retryable failures surface immediately; retryable ones sleep
/// per [`backoff_delay`] and try again until the attempt cap.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryConfig,
    op_name: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let class = e.class();
                if attempt >= policy.max_attempts {
                    warn!(op = op_name, attempt, error = %e, "retry budget exhausted");
                    return Err(e);
                }
                match backoff_delay(class, attempt, policy) {
                    Some(delay) => {
                        debug!(
                            op = op_name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying after classified failure"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}
