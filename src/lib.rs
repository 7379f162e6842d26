//! # Hardpoint
//!
//! An HTTP client factory: register named or typed clients once at startup,
//! resolve them anywhere, and let each request flow through an ordered
//! middleware chain and a composable resilience policy (retry, timeout,
//! circuit breaker) before reaching the transport.
//!
//! ## Features
//!
//! - **Named and typed clients**: resolve by logical name or by service type,
//!   both backed by one cached pipeline per registration
//! - **Middleware pipeline**: ordered onion-model handlers that can mutate
//!   requests or short-circuit before any network I/O
//! - **Retry with Backoff**: constant, linear, or exponential delay with a
//!   configurable retryable-outcome predicate
//! - **Circuit Breaker**: consecutive-failure tripping with a single-probe
//!   half-open recovery
//! - **Timeouts**: an overall deadline that cancels the in-flight call
//! - **Policy registry and conditional selection**: share policies across
//!   clients by key, or pick a policy per request by method, path, or header
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hardpoint::{ClientConfig, ClientRegistry, ClientRegistration, ResiliencePolicy, RetryPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ClientRegistry::new();
//!
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.github.com/")
//!         .default_header("Accept", "application/vnd.github.v3+json")
//!         .default_header("User-Agent", "hardpoint-sample")
//!         .build();
//!
//!     registry.register_named(
//!         "github",
//!         ClientRegistration::new(config)
//!             .policy(ResiliencePolicy::retry(RetryPolicy::constant(
//!                 3,
//!                 Duration::from_millis(600),
//!             ))),
//!     )?;
//!
//!     let client = registry.client("github")?;
//!     let response = client.get("repos/rust-lang/rust/issues").send().await?;
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Shared policies and conditional selection
//!
//! ```rust,no_run
//! use hardpoint::{
//!     ClientConfig, ClientRegistration, ClientRegistry, PolicyRegistry, PolicySelector,
//!     RequestPredicate, ResiliencePolicy,
//! };
//! use http::Method;
//! use std::time::Duration;
//!
//! fn configure() -> Result<(), Box<dyn std::error::Error>> {
//!     let policies = PolicyRegistry::new();
//!     policies.register("regular", ResiliencePolicy::timeout(Duration::from_secs(10)))?;
//!     policies.register("long", ResiliencePolicy::timeout(Duration::from_secs(30)))?;
//!
//!     let registry = ClientRegistry::new();
//!     let selector = PolicySelector::new(policies.lookup("long")?)
//!         .when(RequestPredicate::Method(Method::GET), policies.lookup("regular")?);
//!
//!     registry.register_named(
//!         "conditional",
//!         ClientRegistration::new(ClientConfig::builder().base_url("https://svc.example/").build())
//!             .selector(selector),
//!     )?;
//!     Ok(())
//! }
//! ```

mod circuit_breaker;
mod client;
mod config;
mod error;
mod middleware;
mod pipeline;
mod policy;
mod policy_registry;
mod registry;
mod request;
mod response;
mod retry;
mod selector;
mod settings;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::HttpClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{HttpClientError, Result};
pub use middleware::{
    HeaderValidationMiddleware, LoggingMiddleware, Middleware, Next, RequestIdMiddleware,
};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use policy::ResiliencePolicy;
pub use policy_registry::PolicyRegistry;
pub use registry::{ClientRegistration, ClientRegistry, TypedClient};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use selector::{PolicySelector, RequestPredicate};
pub use settings::{
    BackoffKind, CircuitBreakerSpec, ClientSettings, ConditionalPolicy, ConditionalRule,
    FactorySettings, MiddlewareSpec, PolicyRef, PolicySpec, RetrySpec,
};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use hardpoint::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::client::HttpClient;
    pub use crate::config::{ClientConfig, ClientConfigBuilder};
    pub use crate::error::{HttpClientError, Result};
    pub use crate::middleware::{HeaderValidationMiddleware, LoggingMiddleware, Middleware, Next};
    pub use crate::policy::ResiliencePolicy;
    pub use crate::policy_registry::PolicyRegistry;
    pub use crate::registry::{ClientRegistration, ClientRegistry, TypedClient};
    pub use crate::request::{Request, RequestBuilder};
    pub use crate::response::Response;
    pub use crate::retry::{BackoffStrategy, RetryPolicy};
    pub use crate::selector::{PolicySelector, RequestPredicate};
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
}
