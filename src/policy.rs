//! Resilience policy composition and execution.
//!
//! A policy is an optional stack of three wrappers nested as
//! `Timeout(Retry(CircuitBreaker(send)))`: every retry attempt independently
//! consults and updates breaker state, and the timeout bounds the whole
//! retried operation. Dropping the timed-out future cancels the in-flight
//! transport call, so the connection is released rather than leaked.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::retry::RetryPolicy;
use crate::{HttpClientError, Request, Response, Result};
use http::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Statuses the circuit breaker counts as failures (transient HTTP errors).
fn transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// A composed resilience policy wrapping outgoing calls.
///
/// Cloning a policy shares its circuit breaker state; registering a policy in
/// a [`PolicyRegistry`](crate::PolicyRegistry) and referencing it from several
/// clients therefore shares one breaker across all of them.
#[derive(Debug, Clone, Default)]
pub struct ResiliencePolicy {
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ResiliencePolicy {
    /// A pass-through policy with no wrappers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy with only an overall timeout.
    pub fn timeout(limit: Duration) -> Self {
        Self::new().with_timeout(limit)
    }

    /// Policy with only retries.
    pub fn retry(retry: RetryPolicy) -> Self {
        Self::new().with_retry(retry)
    }

    /// Policy with only a circuit breaker.
    pub fn circuit_breaker(config: CircuitBreakerConfig) -> Self {
        Self::new().with_circuit_breaker(config)
    }

    /// Add an overall timeout bounding the whole retried operation.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Add a retry wrapper.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Add a circuit breaker with its own fresh state.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Some(Arc::new(CircuitBreaker::new(config)));
        self
    }

    /// Add an existing circuit breaker, sharing its state with other policies.
    pub fn with_shared_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// The circuit breaker backing this policy, if any.
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Execute `send` under this policy.
    pub(crate) async fn execute<S, Fut>(&self, request: Request, send: S) -> Result<Response>
    where
        S: Fn(Request) -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run_attempts(request, &send))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(HttpClientError::Timeout(limit)),
            },
            None => self.run_attempts(request, &send).await,
        }
    }

    async fn run_attempts<S, Fut>(&self, request: Request, send: &S) -> Result<Response>
    where
        S: Fn(Request) -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let Some(retry) = &self.retry else {
            return self.run_one(request, send).await;
        };

        let mut attempt = 0u32;
        loop {
            match self.run_one(request.clone(), send).await {
                Ok(response) => {
                    if !retry.should_retry_status(response.status().as_u16()) {
                        return Ok(response);
                    }
                    if attempt >= retry.max_retries {
                        let message =
                            response.text().unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(HttpClientError::RetryExhausted {
                            attempts: attempt + 1,
                            source: Box::new(HttpClientError::Response {
                                status: response.status().as_u16(),
                                message,
                            }),
                        });
                    }
                    debug!(
                        attempt = attempt + 1,
                        status = %response.status(),
                        "Retrying request due to status code"
                    );
                }
                Err(e) => {
                    if !retry.should_retry(&e) {
                        return Err(e);
                    }
                    if attempt >= retry.max_retries {
                        return Err(HttpClientError::RetryExhausted {
                            attempts: attempt + 1,
                            source: Box::new(e),
                        });
                    }
                    debug!(
                        attempt = attempt + 1,
                        error = %e,
                        "Retrying request due to error"
                    );
                }
            }

            tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    /// One attempt: consult the breaker, call, record the classified outcome.
    async fn run_one<S, Fut>(&self, request: Request, send: &S) -> Result<Response>
    where
        S: Fn(Request) -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let permit = match &self.breaker {
            Some(breaker) => Some(breaker.try_acquire()?),
            None => None,
        };

        let outcome = send(request).await;

        if let Some(permit) = permit {
            match &outcome {
                Ok(response) if transient_status(response.status()) => permit.record_failure(),
                Ok(_) => permit.record_success(),
                Err(_) => permit.record_failure(),
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use url::Url;

    fn request() -> Request {
        Request::new(http::Method::GET, Url::parse("https://svc.test/x").unwrap())
    }

    fn counting_failure(
        calls: Arc<AtomicU32>,
    ) -> impl Fn(Request) -> futures::future::BoxFuture<'static, Result<Response>> {
        move |_req| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HttpClientError::Connection("refused".into()))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanently_failing_call_runs_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy =
            ResiliencePolicy::retry(RetryPolicy::constant(3, Duration::from_millis(600)));

        let err = policy
            .execute(request(), counting_failure(calls.clone()))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            HttpClientError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, HttpClientError::Connection(_)));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ResiliencePolicy::retry(RetryPolicy::immediate(5));
        let calls2 = calls.clone();

        let err = policy
            .execute(request(), move |_req| {
                let calls = calls2.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Response, _>(HttpClientError::Json("broken".into()))
                }) as futures::future::BoxFuture<'static, Result<Response>>
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, HttpClientError::Json(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy =
            ResiliencePolicy::retry(RetryPolicy::constant(3, Duration::from_millis(600)));
        let calls2 = calls.clone();
        let started = tokio::time::Instant::now();

        let response = policy
            .execute(request(), move |_req| {
                let calls = calls2.clone();
                Box::pin(async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(HttpClientError::Connection("refused".into()))
                    } else {
                        Ok(Response::synthesized(StatusCode::OK, "ok"))
                    }
                }) as futures::future::BoxFuture<'static, Result<Response>>
            })
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two constant 600ms waits
        assert!(started.elapsed() >= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_status_exhaustion_wraps_last_response() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ResiliencePolicy::retry(RetryPolicy::immediate(2));
        let calls2 = calls.clone();

        let err = policy
            .execute(request(), move |_req| {
                let calls = calls2.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Response::synthesized(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "down",
                    ))
                }) as futures::future::BoxFuture<'static, Result<Response>>
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            HttpClientError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.status_code(), Some(503));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_slow_call() {
        let policy = ResiliencePolicy::timeout(Duration::from_millis(100));

        let err = policy
            .execute(request(), |_req| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Response::synthesized(StatusCode::OK, "too late"))
                }) as futures::future::BoxFuture<'static, Result<Response>>
            })
            .await
            .unwrap_err();

        assert!(matches!(err, HttpClientError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_outside_breaker_stops_on_circuit_open() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ResiliencePolicy::retry(RetryPolicy::immediate(10))
            .with_circuit_breaker(CircuitBreakerConfig::new(2, Duration::from_secs(30)));

        let err = policy
            .execute(request(), counting_failure(calls.clone()))
            .await
            .unwrap_err();

        // Two attempts trip the breaker; the third consults it, is rejected
        // without an inner call, and the rejection is not retried.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, HttpClientError::CircuitOpen));
        assert_eq!(policy.breaker().unwrap().state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_status_counts_as_breaker_failure() {
        let policy =
            ResiliencePolicy::circuit_breaker(CircuitBreakerConfig::new(2, Duration::from_secs(30)));

        for _ in 0..2 {
            let response = policy
                .execute(request(), |_req| {
                    Box::pin(async move {
                        Ok(Response::synthesized(StatusCode::BAD_GATEWAY, "bad"))
                    })
                        as futures::future::BoxFuture<'static, Result<Response>>
                })
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }

        assert_eq!(policy.breaker().unwrap().state(), CircuitState::Open);
    }
}
