// =============================================================================
// utils/retry.rs
// =============================================================================
// with_retry - per-attempt timeout + exponential backoff + full jitter.
// Wraps cold store writes issued by the eviction cycle.
// =============================================================================

use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Default per-attempt timeout (ms)
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5000;
/// Default attempts including the first
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Base backoff (ms)
const BACKOFF_BASE_MS: u64 = 50;
/// Maximum backoff cap (ms)
const BACKOFF_MAX_MS: u64 = 5000;

/// Attempt budget for one retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first. Values below 1 behave as 1.
    pub max_attempts: usize,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// The last error (or a timeout error) is returned when every attempt fails.
///
/// # Example
/// ```no_run
/// use tierlog::utils::{with_retry, RetryPolicy};
///
/// async fn example() -> anyhow::Result<u32> {
///     with_retry(RetryPolicy::default(), || async { Ok(7) }).await
/// }
/// ```
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => anyhow::anyhow!(
                "operation timed out after {}ms",
                policy.attempt_timeout.as_millis()
            ),
        };

        if attempt >= max_attempts {
            return Err(error.context(format!("giving up after {} attempts", attempt)));
        }

        let backoff_ms = calculate_backoff_with_jitter(attempt);
        tracing::debug!(
            "Attempt {}/{} failed: {:#}. Retrying in {}ms...",
            attempt,
            max_attempts,
            error,
            backoff_ms
        );
        sleep(Duration::from_millis(backoff_ms)).await;
    }
}

/// Formula: random(0, min(BACKOFF_MAX_MS, BACKOFF_BASE_MS * 2^(attempt-1)))
fn calculate_backoff_with_jitter(attempt: usize) -> u64 {
    let mut rng = rand::thread_rng();

    let exp_backoff = BACKOFF_BASE_MS
        .saturating_mul(2_u64.saturating_pow((attempt.saturating_sub(1)) as u32));
    let capped_backoff = exp_backoff.min(BACKOFF_MAX_MS);

    rng.gen_range(0..=capped_backoff)
}
