//! Retry policy for unreliable external calls.
//!
//! [`RetryPolicy`] is a plain value: an attempt bound, a total elapsed-time bound and an
//! exponential backoff curve with jitter. It wraps any async operation through
//! [`RetryPolicy::run`]; the operation closure is re-invoked on every attempt so each
//! try builds its own request. Whichever bound is hit first stops retrying.

use crate::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry settings as they appear in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,

    /// Fraction of the computed delay added as random jitter (0.0 disables)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_elapsed_ms() -> u64 {
    120_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(format!(
                "jitter_ratio must be between 0.0 and 1.0, got {}",
                self.jitter_ratio
            ));
        }
        Ok(())
    }
}

/// Retryable-error predicate used by [`RetryPolicy::run`]
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-requested delay, overriding the backoff curve for this retry.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Why [`RetryPolicy::run`] gave up
#[derive(Debug)]
pub enum RetryError<E> {
    NonRetryable { attempts: u32, error: E },
    AttemptsExhausted { attempts: u32, error: E },
    DeadlineExceeded { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NonRetryable { attempts, .. }
            | RetryError::AttemptsExhausted { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    pub fn error(&self) -> &E {
        match self {
            RetryError::NonRetryable { error, .. }
            | RetryError::AttemptsExhausted { error, .. }
            | RetryError::DeadlineExceeded { error, .. } => error,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            RetryError::NonRetryable { error, .. }
            | RetryError::AttemptsExhausted { error, .. }
            | RetryError::DeadlineExceeded { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    max_elapsed: Duration,
    jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_elapsed: Duration::from_millis(config.max_elapsed_ms),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }

    /// No waiting between attempts. Useful where only the attempt bound matters.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_elapsed: Duration::MAX,
            jitter_ratio: 0.0,
        }
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = cap.max(base);
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay before retry number `retry` (0-based): `min(cap, base * 2^retry)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_ratio;
        let extra = rand::thread_rng().gen_range(0.0..=spread);
        delay + Duration::from_secs_f64(extra)
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    fn next_delay<E: Retryable>(&self, error: &E, attempt: u32) -> Duration {
        match error.retry_after() {
            Some(requested) => requested.min(self.max_delay),
            None => self.jittered(self.backoff_delay(attempt.saturating_sub(1))),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or a bound is hit.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(attempt, error = %error, "Non-retryable failure");
                return Err(RetryError::NonRetryable {
                    attempts: attempt,
                    error,
                });
            }

            if attempt >= self.max_attempts {
                return Err(RetryError::AttemptsExhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.next_delay(&error, attempt);
            let elapsed = started.elapsed();
            if elapsed.saturating_add(delay) > self.max_elapsed {
                warn!(
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "Retry deadline would be exceeded, giving up"
                );
                return Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    error,
                });
            }

            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
