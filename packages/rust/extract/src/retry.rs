//! Bounded retry around a fallible async operation.

use std::future::Future;
use std::time::Duration;

use govdata_shared::Result;
use tracing::warn;

/// How many extra attempts to make, and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only errors for which [`is_transient`] holds are retried. `op` receives the
/// 1-based attempt number.
///
/// [`is_transient`]: govdata_shared::GovDataError::is_transient
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt <= policy.retries => {
                warn!(
                    operation,
                    attempt,
                    retries = policy.retries,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "transient failure, will retry"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
}
