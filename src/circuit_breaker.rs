//! Circuit breaker state machine.
//!
//! States: Closed (calls pass through, consecutive failures counted), Open
//! (calls rejected until the break duration elapses), HalfOpen (exactly one
//! probe admitted; its outcome decides between Closed and Open). All state
//! lives behind a single mutex so transitions are atomic under concurrency.

use crate::{HttpClientError, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls are allowed.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// One probe call is allowed to test recovery.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker config.
    pub fn new(failure_threshold: u32, break_duration: Duration) -> Self {
        Self {
            failure_threshold,
            break_duration,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker shared by every concurrent caller of a policy instance.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the Closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state, after applying the Open → HalfOpen timer transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.tick(&mut inner);
        inner.state
    }

    /// Current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Ask for permission to make a call.
    ///
    /// Returns a permit whose outcome must be recorded. While HalfOpen, only
    /// one permit is handed out; concurrent callers get `CircuitOpen` until
    /// the probe resolves. A permit dropped without a recorded outcome counts
    /// a cancelled probe as a failure so the circuit cannot wedge half-open.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>> {
        let mut inner = self.inner.lock();
        self.tick(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(CallPermit {
                breaker: self,
                probe: false,
                resolved: false,
            }),
            CircuitState::Open => Err(HttpClientError::CircuitOpen),
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(HttpClientError::CircuitOpen);
                }
                inner.probe_in_flight = true;
                debug!("Circuit breaker admitting half-open probe");
                Ok(CallPermit {
                    breaker: self,
                    probe: true,
                    resolved: false,
                })
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker closing after successful probe");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {
                debug!("Success recorded while circuit open, ignoring");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                // Failed probe, break timer starts over
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the circuit back to Closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    fn open(&self, inner: &mut Inner) {
        warn!(
            failures = inner.consecutive_failures,
            "Circuit breaker opening"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
    }

    fn tick(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && let Some(opened) = inner.opened_at
            && opened.elapsed() >= self.config.break_duration
        {
            debug!("Circuit breaker transitioning to half-open");
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;
        }
    }
}

/// Permission to make one call through a circuit breaker.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl CallPermit<'_> {
    /// Record the call as successful.
    pub fn record_success(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    /// Record the call as failed.
    pub fn record_failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.probe {
            // Cancelled probe, treat as failure
            self.breaker.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, break_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::new(
            threshold,
            Duration::from_millis(break_ms),
        ))
    }

    #[test]
    fn opens_exactly_at_threshold() {
        let cb = breaker(3, 1000);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            cb.try_acquire().unwrap_err(),
            HttpClientError::CircuitOpen
        ));
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = breaker(3, 1000);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_a_single_probe() {
        let cb = breaker(1, 20);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let permit = cb.try_acquire().unwrap();
        // Second caller while the probe is in flight is rejected as if open
        assert!(matches!(
            cb.try_acquire().unwrap_err(),
            HttpClientError::CircuitOpen
        ));

        permit.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn failed_probe_reopens_and_restarts_timer() {
        let cb = breaker(1, 20);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));

        let permit = cb.try_acquire().unwrap();
        permit.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn dropped_probe_counts_as_failure() {
        let cb = breaker(1, 20);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));

        {
            let _permit = cb.try_acquire().unwrap();
            // dropped without an outcome
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn closed_permit_drop_is_inert() {
        let cb = breaker(2, 1000);
        {
            let _permit = cb.try_acquire().unwrap();
        }
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
