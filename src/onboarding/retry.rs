//! Bounded retry policy for transient persistence failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::OnboardingError;

/// Retry configuration: attempt bound plus exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Scale each delay by a random factor in [0.5, 1.0].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately (for tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay after the `failed_attempt`-th failure (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    /// Run `op`, retrying only transient failures, at most `max_attempts`
    /// times. The final transient failure is surfaced as
    /// `PersistenceUnavailable` carrying the attempt count.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, OnboardingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OnboardingError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient persistence failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(OnboardingError::PersistenceUnavailable { reason, .. }) => {
                    tracing::warn!(operation, attempts = attempt, "Giving up after retries");
                    return Err(OnboardingError::PersistenceUnavailable {
                        attempts: attempt,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
