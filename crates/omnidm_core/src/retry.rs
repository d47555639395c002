//! Bounded retry with exponential backoff for transient driver failures.

use crate::error::{OdmError, OdmResult};
use omnidm_driver::{DriverError, DriverResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, before jitter.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a policy with no retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs `call` until it succeeds, fails permanently, or the policy or
/// deadline is exhausted.
///
/// Only [`DriverError::Transient`] is retried. A retry whose backoff would
/// end past `deadline` is not attempted; the call fails with a timeout.
pub(crate) fn run<T>(
    policy: &RetryPolicy,
    backend: &str,
    operation: &str,
    deadline: Option<Instant>,
    mut call: impl FnMut() -> DriverResult<T>,
) -> OdmResult<T> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(OdmError::timeout(backend, operation));
        }
        let error: DriverError = match call() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        attempt += 1;
        if !error.is_retryable() || attempt >= max_attempts {
            return Err(OdmError::from_driver(backend, operation, error));
        }
        let delay = policy.delay_for_attempt(attempt);
        if deadline.is_some_and(|d| Instant::now() + delay >= d) {
            return Err(OdmError::timeout(backend, operation));
        }
        warn!(
            backend,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, retrying"
        );
        std::thread::sleep(delay);
    }
}
