//! # Transient Failure Retry
//!
//! Bounded exponential backoff for transient store errors.
//!
//! A transient failure terminates the transaction it happened in, so only
//! units that can be replayed whole are retried:
//! - opening a transaction
//! - auto-commit statements (index creation, query compilation)
//! - a whole turn, replayed from a fresh transaction by `Engine::run_turn`
//!
//! Logical failures (bad queries, missing endpoints, comparator verdicts)
//! are never retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule for transient errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry, capped.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(20);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Await `$call` until it succeeds, fails non-transiently, or the policy's
/// attempts are spent. `$call` is re-evaluated for every attempt.
macro_rules! retry_transient {
    ($policy:expr, $op:expr, $call:expr) => {{
        let policy: $crate::retry::RetryPolicy = $policy;
        let mut attempt: u32 = 1;
        loop {
            match $call.await {
                Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay(attempt - 1);
                    tracing::warn!(
                        operation = $op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => break result,
            }
        }
    }};
}

pub(crate) use retry_transient;
