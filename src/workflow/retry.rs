use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{AppError, ErrorClass};

/// Failure returned once an operation can no longer be retried.
///
/// Exhausted retries and immediately fatal errors look the same to callers:
/// both carry the last underlying error.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct FatalError {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: AppError,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    factor: f64,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(8))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            factor: if factor.is_finite() && factor >= 1.0 { factor } else { 1.0 },
            max_delay,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based),
    /// before jitter: `base * factor^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let scale: f64 = rand::thread_rng().gen_range(0.5..=1.0);
        delay.mul_f64(scale)
    }

    /// Run `operation` until it succeeds, fails fatally, or runs out of attempts.
    pub async fn execute<T, F, Fut, C>(
        &self,
        name: &str,
        mut operation: F,
        classify: C,
    ) -> std::result::Result<T, FatalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, AppError>>,
        C: Fn(&AppError) -> ErrorClass,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if classify(&error) == ErrorClass::Fatal {
                tracing::warn!(operation = name, attempt, error = %error, "Fatal error, not retrying");
                return Err(FatalError {
                    operation: name.to_string(),
                    attempts: attempt,
                    source: error,
                });
            }

            if attempt >= self.max_attempts {
                tracing::error!(
                    operation = name,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(FatalError {
                    operation: name.to_string(),
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.jittered(self.backoff(attempt - 1));
            tracing::warn!(
                operation = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
