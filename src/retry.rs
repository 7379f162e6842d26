//! Retry policy and backoff strategies.

use crate::HttpClientError;
use std::time::Duration;

/// Retry policy.
///
/// `max_retries` counts additional attempts after the initial call, so a
/// permanently failing operation is invoked `max_retries + 1` times in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff strategy between attempts.
    pub backoff: BackoffStrategy,
    /// Status codes that count as retryable outcomes.
    pub retry_status_codes: Vec<u16>,
    /// Whether to retry on connection errors.
    pub retry_on_connection_error: bool,
    /// Whether to retry on timeout errors.
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(10),
                multiplier: 2.0,
            },
            retry_status_codes: vec![408, 429, 500, 502, 503, 504],
            retry_on_connection_error: true,
            retry_on_timeout: true,
        }
    }
}

impl RetryPolicy {
    /// Retry with a constant delay between attempts.
    pub fn constant(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::Constant(delay),
            ..Default::default()
        }
    }

    /// Retry with exponential backoff.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::Exponential {
                initial: initial_delay,
                max: Duration::from_secs(30),
                multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    /// Retry with linear backoff.
    pub fn linear(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::Linear {
                delay,
                max: Duration::from_secs(30),
            },
            ..Default::default()
        }
    }

    /// Retry immediately with no delay.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::None,
            ..Default::default()
        }
    }

    /// Replace the set of retryable status codes.
    pub fn with_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retry_status_codes = codes;
        self
    }

    /// Disable retry on connection errors.
    pub fn no_retry_on_connection(mut self) -> Self {
        self.retry_on_connection_error = false;
        self
    }

    /// Disable retry on timeout errors.
    pub fn no_retry_on_timeout(mut self) -> Self {
        self.retry_on_timeout = false;
        self
    }

    /// Delay before the retry with the given 0-based index.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }

    /// Check if a response status counts as a retryable outcome.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Check if an error counts as a retryable outcome.
    ///
    /// Configuration errors and `CircuitOpen` are never retried; a breaker
    /// rejection surfaces immediately so callers can back off.
    pub fn should_retry(&self, error: &HttpClientError) -> bool {
        match error {
            HttpClientError::Timeout(_) => self.retry_on_timeout,
            HttpClientError::Connection(_) => self.retry_on_connection_error,
            HttpClientError::Response { status, .. } => self.retry_status_codes.contains(status),
            HttpClientError::Http(e) => {
                if e.is_timeout() {
                    self.retry_on_timeout
                } else if e.is_connect() {
                    self.retry_on_connection_error
                } else if let Some(status) = e.status() {
                    self.retry_status_codes.contains(&status.as_u16())
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Constant delay between retries.
    Constant(Duration),
    /// Linear backoff: delay grows by a fixed increment.
    Linear {
        /// Delay increment per attempt.
        delay: Duration,
        /// Maximum delay.
        max: Duration,
    },
    /// Exponential backoff.
    Exponential {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Growth factor (typically 2.0).
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Delay for the retry with the given 0-based index.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Linear { delay, max } => delay.saturating_mul(attempt + 1).min(*max),
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}
