//! Outbound middleware chain.
//!
//! Middleware wrap each other onion-style: the first middleware's outbound
//! work runs before the second's, and its inbound work runs after. A
//! middleware may short-circuit by returning a synthesized response or an
//! error without calling `next`, in which case nothing reaches the network.

use crate::pipeline::Terminal;
use crate::{Request, Response, Result};
use async_trait::async_trait;
use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// A unit in the outbound pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and invoke the rest of the chain via `next`.
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response>;
}

/// Handle to the remainder of the chain, ending in the policy-wrapped sender.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    terminal: &'a Terminal,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middlewares: &'a [Arc<dyn Middleware>], terminal: &'a Terminal) -> Self {
        Self {
            middlewares,
            terminal,
        }
    }

    /// Run the rest of the chain.
    pub async fn run(self, request: Request) -> Result<Response> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                current
                    .handle(request, Next::new(rest, self.terminal))
                    .await
            }
            None => self.terminal.send(request).await,
        }
    }
}

/// Rejects outgoing requests that are missing a required header.
///
/// Short-circuits with a synthesized 400 response before any network I/O,
/// the way an outgoing-request validator should.
pub struct HeaderValidationMiddleware {
    header: String,
}

impl HeaderValidationMiddleware {
    /// Require the given header on every outgoing request.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

#[async_trait]
impl Middleware for HeaderValidationMiddleware {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if !request.headers().contains_key(self.header.as_str()) {
            warn!(header = %self.header, "Rejecting request missing required header");
            return Ok(Response::synthesized(
                StatusCode::BAD_REQUEST,
                format!("required header {} is missing", self.header),
            ));
        }
        next.run(request).await
    }
}

/// Logs outgoing requests and their outcomes.
pub struct LoggingMiddleware {
    log_headers: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware.
    pub fn new() -> Self {
        Self { log_headers: false }
    }

    /// Also log request headers at trace level.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        debug!(
            method = %request.method(),
            url = %request.url(),
            "Sending HTTP request"
        );

        if self.log_headers {
            for (name, value) in request.headers() {
                tracing::trace!(header = %name, value = ?value, "Request header");
            }
        }

        let start = std::time::Instant::now();
        let result = next.run(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => debug!(
                status = %response.status(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Received HTTP response"
            ),
            Err(e) => warn!(
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "HTTP request failed"
            ),
        }

        result
    }
}

/// Adds a unique ID header to each outgoing request.
pub struct RequestIdMiddleware {
    header_name: String,
}

impl RequestIdMiddleware {
    /// Create a request ID middleware using `X-Request-ID`.
    pub fn new() -> Self {
        Self {
            header_name: "X-Request-ID".to_string(),
        }
    }

    /// Create with a custom header name.
    pub fn with_header(header: impl Into<String>) -> Self {
        Self {
            header_name: header.into(),
        }
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        let request_id = format!(
            "{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        if let (Ok(name), Ok(value)) = (
            http::HeaderName::try_from(self.header_name.as_str()),
            http::HeaderValue::try_from(request_id.as_str()),
        ) {
            request.headers_mut().insert(name, value);
        }

        next.run(request).await
    }
}
