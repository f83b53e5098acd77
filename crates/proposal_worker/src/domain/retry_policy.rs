use common::IngestError;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
}

/// Decides whether a failed ingest attempt is worth repeating.
///
/// Implementations are pure functions of their inputs.
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed
    fn decide(&self, attempt: u32, error: &IngestError) -> RetryDecision;

    fn max_attempts(&self) -> u32;
}

/// Retries transient failures up to a fixed number of total attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetryPolicy {
    max_attempts: u32,
}

impl BoundedRetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for BoundedRetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy for BoundedRetryPolicy {
    fn decide(&self, attempt: u32, error: &IngestError) -> RetryDecision {
        if error.is_transient() && attempt < self.max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::GiveUp
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Pause inserted before a retry. Never consulted before the first attempt.
pub trait RetryDelay: Send + Sync {
    /// Delay before `next_attempt` (2 for the first retry)
    fn delay_before(&self, next_attempt: u32) -> Duration;
}

/// Retry immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl RetryDelay for NoDelay {
    fn delay_before(&self, _next_attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Exponential backoff with full jitter: uniform in `[0, min(max, base * 2^(n-2))]`
#[derive(Debug, Clone, Copy)]
pub struct JitteredBackoff {
    base: Duration,
    max: Duration,
}

impl JitteredBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    fn ceiling(&self, next_attempt: u32) -> Duration {
        let exponent = next_attempt.saturating_sub(2).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl RetryDelay for JitteredBackoff {
    fn delay_before(&self, next_attempt: u32) -> Duration {
        let ceiling = self.ceiling(next_attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }
}
