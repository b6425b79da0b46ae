//! Retry / timeout executor for single vendor calls.
//!
//! Every attempt gets its own fresh deadline. Failed attempts are followed by
//! a linear backoff (`unit * 1`, `unit * 2`, …) unless they were the last one.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use genroute_core::config::ProviderConfig;
use genroute_core::{GenError, Result};

/// Default attempts per call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default backoff step.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_millis(1000);

/// How many times to try and how long each try may take.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts (not re-tries). Zero is treated as one.
    pub max_attempts: u32,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
    /// Backoff step; the sleep after attempt `i` (0-based) is `unit * (i + 1)`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    /// Policy from a provider config, falling back to the defaults.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            timeout: config
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Sleep after failed attempt `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit * (attempt + 1)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// A timed-out attempt becomes a `Provider` error tagged with `label`. The
/// last error is returned unchanged once every attempt has failed.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let outcome = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(GenError::provider(
                label,
                format!("request timed out after {}ms", policy.timeout.as_millis()),
            )),
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(provider = label, attempt = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt + 1 >= attempts => {
                warn!(provider = label, attempts, error = %e, "all attempts failed");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    provider = label,
                    attempt = attempt + 1,
                    of = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
