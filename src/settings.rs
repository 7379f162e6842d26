//! Declarative configuration schema for clients and policies.
//!
//! Mirrors the registration API: policies keyed by name, clients with a base
//! address, default headers, ordered middleware identifiers, and a policy
//! reference (inline spec, registry key, or conditional rules with a default
//! key).

use crate::middleware::{
    HeaderValidationMiddleware, LoggingMiddleware, Middleware, RequestIdMiddleware,
};
use crate::registry::{ClientRegistration, ClientRegistry};
use crate::retry::RetryPolicy;
use crate::selector::{PolicySelector, RequestPredicate};
use crate::{
    CircuitBreakerConfig, ClientConfig, HttpClientError, PolicyRegistry, ResiliencePolicy, Result,
};
use http::Method;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Top-level settings: named policies plus named clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactorySettings {
    /// Policies registered before any client references them.
    #[serde(default)]
    pub policies: HashMap<String, PolicySpec>,
    /// Client registrations keyed by logical name.
    #[serde(default)]
    pub clients: HashMap<String, ClientSettings>,
}

/// Declarative settings for one named client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// Base URL joined with relative request paths.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default headers as ordered name/value pairs.
    #[serde(default)]
    pub default_headers: Vec<(String, String)>,
    /// User agent override.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Ordered middleware identifiers.
    #[serde(default)]
    pub middleware: Vec<MiddlewareSpec>,
    /// Resilience policy reference.
    #[serde(default)]
    pub policy: Option<PolicyRef>,
}

/// Middleware identifier with its parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MiddlewareSpec {
    /// Reject requests missing a required header.
    ValidateHeader {
        /// Required header name.
        header: String,
    },
    /// Log requests and outcomes.
    Logging {
        /// Also log request headers.
        #[serde(default)]
        log_headers: bool,
    },
    /// Stamp requests with a unique ID header.
    RequestId {
        /// Custom header name; defaults to `X-Request-ID`.
        #[serde(default)]
        header: Option<String>,
    },
}

impl MiddlewareSpec {
    fn build(&self) -> Arc<dyn Middleware> {
        match self {
            Self::ValidateHeader { header } => {
                Arc::new(HeaderValidationMiddleware::new(header.clone()))
            }
            Self::Logging { log_headers } => {
                let middleware = LoggingMiddleware::new();
                Arc::new(if *log_headers {
                    middleware.with_headers()
                } else {
                    middleware
                })
            }
            Self::RequestId { header } => Arc::new(match header {
                Some(header) => RequestIdMiddleware::with_header(header.clone()),
                None => RequestIdMiddleware::new(),
            }),
        }
    }
}

/// Reference to a resilience policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PolicyRef {
    /// A key into the shared policy registry.
    Key(String),
    /// Conditional per-request selection over registry keys.
    Conditional(ConditionalPolicy),
    /// An inline policy spec private to this client.
    Inline(PolicySpec),
}

/// Conditional selector spec: ordered rules plus a default registry key.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionalPolicy {
    /// Rules evaluated in order; first match wins.
    pub rules: Vec<ConditionalRule>,
    /// Registry key of the policy applied when no rule matches.
    pub default: String,
}

/// One conditional rule; all present attributes must match.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionalRule {
    /// HTTP method to match.
    #[serde(default)]
    pub method: Option<String>,
    /// URL path prefix to match.
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// Header that must be present.
    #[serde(default)]
    pub header: Option<String>,
    /// Registry key of the policy to apply.
    pub policy: String,
}

impl ConditionalRule {
    fn predicate(&self) -> Result<RequestPredicate> {
        let mut predicates = Vec::new();
        if let Some(method) = &self.method {
            let method = method.to_uppercase().parse::<Method>().map_err(|_| {
                HttpClientError::Configuration(format!("invalid method in policy rule: {method}"))
            })?;
            predicates.push(RequestPredicate::Method(method));
        }
        if let Some(prefix) = &self.path_prefix {
            predicates.push(RequestPredicate::PathPrefix(prefix.clone()));
        }
        if let Some(header) = &self.header {
            predicates.push(RequestPredicate::HasHeader(header.clone()));
        }
        if predicates.is_empty() {
            return Err(HttpClientError::Configuration(
                "policy rule matches nothing: set method, path_prefix, or header".to_string(),
            ));
        }
        Ok(if predicates.len() == 1 {
            predicates.pop().unwrap()
        } else {
            RequestPredicate::All(predicates)
        })
    }
}

/// Inline policy spec, composing timeout, retry, and circuit breaker.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySpec {
    /// Overall timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Retry settings.
    #[serde(default)]
    pub retry: Option<RetrySpec>,
    /// Circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSpec>,
}

impl PolicySpec {
    /// Build the policy this spec describes.
    pub fn build(&self) -> ResiliencePolicy {
        let mut policy = ResiliencePolicy::new();
        if let Some(ms) = self.timeout_ms {
            policy = policy.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retry) = &self.retry {
            policy = policy.with_retry(retry.build());
        }
        if let Some(breaker) = &self.circuit_breaker {
            policy = policy.with_circuit_breaker(CircuitBreakerConfig::new(
                breaker.failure_threshold,
                Duration::from_millis(breaker.break_duration_ms),
            ));
        }
        policy
    }
}

/// Retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySpec {
    /// Additional attempts after the initial call.
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Backoff shape.
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Override the retryable status codes.
    #[serde(default)]
    pub retry_status_codes: Option<Vec<u16>>,
}

impl RetrySpec {
    fn build(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        let mut policy = match self.backoff {
            BackoffKind::Constant => RetryPolicy::constant(self.max_retries, delay),
            BackoffKind::Linear => RetryPolicy::linear(self.max_retries, delay),
            BackoffKind::Exponential => RetryPolicy::exponential(self.max_retries, delay),
            BackoffKind::None => RetryPolicy::immediate(self.max_retries),
        };
        if let Some(codes) = &self.retry_status_codes {
            policy = policy.with_status_codes(codes.clone());
        }
        policy
    }
}

/// Backoff shape for retry settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay.
    #[default]
    Constant,
    /// Linearly growing delay.
    Linear,
    /// Exponentially growing delay.
    Exponential,
    /// No delay.
    None,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSpec {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Break duration in milliseconds.
    pub break_duration_ms: u64,
}

impl ClientRegistry {
    /// Populate registries from declarative settings.
    ///
    /// Policies register first so clients can reference them by key. Meant
    /// for the one-time startup phase; duplicate names or keys fail the same
    /// way direct registration does.
    pub fn apply_settings(
        &self,
        settings: &FactorySettings,
        policies: &PolicyRegistry,
    ) -> Result<()> {
        for (key, spec) in &settings.policies {
            policies.register(key.clone(), spec.build())?;
        }

        for (name, client) in &settings.clients {
            let mut config = ClientConfig::builder();
            if let Some(base) = &client.base_url {
                config = config.base_url(base);
            }
            if let Some(user_agent) = &client.user_agent {
                config = config.user_agent(user_agent);
            }
            for (header, value) in &client.default_headers {
                config = config.default_header(header, value);
            }

            let mut registration = ClientRegistration::new(config.build());
            for spec in &client.middleware {
                registration = registration.middleware_shared(spec.build());
            }

            if let Some(policy) = &client.policy {
                registration = match policy {
                    PolicyRef::Key(key) => registration.shared_policy(policies.lookup(key)?),
                    PolicyRef::Inline(spec) => registration.policy(spec.build()),
                    PolicyRef::Conditional(conditional) => {
                        let mut selector =
                            PolicySelector::new(policies.lookup(&conditional.default)?);
                        for rule in &conditional.rules {
                            selector =
                                selector.when(rule.predicate()?, policies.lookup(&rule.policy)?);
                        }
                        registration.selector(selector)
                    }
                };
            }

            self.register_named(name.clone(), registration)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_settings() {
        let settings: FactorySettings = serde_json::from_value(serde_json::json!({
            "policies": {
                "regular": { "timeout_ms": 10000 },
                "long": { "timeout_ms": 30000 },
                "guarded": {
                    "retry": { "max_retries": 3, "delay_ms": 600 },
                    "circuit_breaker": { "failure_threshold": 5, "break_duration_ms": 30000 }
                }
            },
            "clients": {
                "github": {
                    "base_url": "https://api.github.com/",
                    "default_headers": [
                        ["Accept", "application/vnd.github.v3+json"],
                        ["User-Agent", "hardpoint-sample"]
                    ],
                    "policy": "guarded"
                },
                "external": {
                    "base_url": "https://localhost:5000/",
                    "middleware": [{ "kind": "validate_header", "header": "X-API-KEY" }]
                },
                "conditional": {
                    "base_url": "https://svc.test/",
                    "policy": {
                        "rules": [{ "method": "GET", "policy": "regular" }],
                        "default": "long"
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(settings.policies.len(), 3);
        assert_eq!(settings.clients.len(), 3);
        assert!(matches!(
            settings.clients["github"].policy,
            Some(PolicyRef::Key(_))
        ));
        assert!(matches!(
            settings.clients["conditional"].policy,
            Some(PolicyRef::Conditional(_))
        ));
    }

    #[test]
    fn inline_policy_ref_parses() {
        let settings: FactorySettings = serde_json::from_value(serde_json::json!({
            "clients": {
                "svc": {
                    "base_url": "https://svc.test/",
                    "policy": { "retry": { "max_retries": 2, "backoff": "none" } }
                }
            }
        }))
        .unwrap();

        match &settings.clients["svc"].policy {
            Some(PolicyRef::Inline(spec)) => {
                let retry = spec.retry.as_ref().unwrap();
                assert_eq!(retry.max_retries, 2);
                assert_eq!(retry.backoff, BackoffKind::None);
            }
            other => panic!("expected inline policy, got {other:?}"),
        }
    }

    #[test]
    fn empty_rule_is_rejected() {
        let rule = ConditionalRule {
            method: None,
            path_prefix: None,
            header: None,
            policy: "regular".into(),
        };
        assert!(matches!(
            rule.predicate(),
            Err(HttpClientError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let rule = ConditionalRule {
            method: Some("GE T".into()),
            path_prefix: None,
            header: None,
            policy: "regular".into(),
        };
        assert!(matches!(
            rule.predicate(),
            Err(HttpClientError::Configuration(_))
        ));
    }

    #[test]
    fn apply_settings_registers_policies_and_clients() {
        let settings: FactorySettings = serde_json::from_value(serde_json::json!({
            "policies": {
                "regular": { "timeout_ms": 10000 }
            },
            "clients": {
                "svc": { "base_url": "https://svc.test/", "policy": "regular" }
            }
        }))
        .unwrap();

        let clients = ClientRegistry::new();
        let policies = PolicyRegistry::new();
        clients.apply_settings(&settings, &policies).unwrap();

        assert!(policies.contains("regular"));
        assert!(clients.client("svc").is_ok());
    }

    #[test]
    fn apply_settings_fails_on_unknown_policy_key() {
        let settings: FactorySettings = serde_json::from_value(serde_json::json!({
            "clients": {
                "svc": { "base_url": "https://svc.test/", "policy": "missing" }
            }
        }))
        .unwrap();

        let clients = ClientRegistry::new();
        let policies = PolicyRegistry::new();
        assert!(matches!(
            clients.apply_settings(&settings, &policies),
            Err(HttpClientError::UnknownPolicy(_))
        ));
    }
}
