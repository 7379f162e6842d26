//! Per-request policy selection.

use crate::{Request, ResiliencePolicy};
use http::Method;
use std::sync::Arc;

/// Predicate over request attributes.
#[derive(Debug, Clone)]
pub enum RequestPredicate {
    /// Match the HTTP method.
    Method(Method),
    /// Match a URL path prefix.
    PathPrefix(String),
    /// Require a header to be present.
    HasHeader(String),
    /// Require a header to carry an exact value.
    HeaderEquals {
        /// Header name.
        name: String,
        /// Required value.
        value: String,
    },
    /// All of the inner predicates must match.
    All(Vec<RequestPredicate>),
}

impl RequestPredicate {
    /// Evaluate the predicate against a request. Pure and deterministic.
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Self::Method(method) => request.method() == method,
            Self::PathPrefix(prefix) => request.path().starts_with(prefix.as_str()),
            Self::HasHeader(name) => request.headers().contains_key(name.as_str()),
            Self::HeaderEquals { name, value } => request.header(name) == Some(value.as_str()),
            Self::All(predicates) => predicates.iter().all(|p| p.matches(request)),
        }
    }
}

/// Chooses the resilience policy for each outgoing request.
///
/// Rules are evaluated in order against the request; the first match wins and
/// the default applies otherwise. Selection runs fresh on every request, so
/// different requests through the same client can route to different policies.
#[derive(Debug, Clone)]
pub struct PolicySelector {
    rules: Vec<(RequestPredicate, Arc<ResiliencePolicy>)>,
    default: Arc<ResiliencePolicy>,
}

impl PolicySelector {
    /// Selector with a default policy and no conditional rules.
    pub fn new(default: Arc<ResiliencePolicy>) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Selector that always returns the given policy.
    pub fn fixed(policy: ResiliencePolicy) -> Self {
        Self::new(Arc::new(policy))
    }

    /// Selector that always returns the given shared policy.
    pub fn fixed_shared(policy: Arc<ResiliencePolicy>) -> Self {
        Self::new(policy)
    }

    /// Add a conditional rule. Rules match in insertion order.
    pub fn when(mut self, predicate: RequestPredicate, policy: Arc<ResiliencePolicy>) -> Self {
        self.rules.push((predicate, policy));
        self
    }

    /// Select the policy for a request.
    pub fn select(&self, request: &Request) -> &Arc<ResiliencePolicy> {
        for (predicate, policy) in &self.rules {
            if predicate.matches(request) {
                return policy;
            }
        }
        &self.default
    }
}

impl Default for PolicySelector {
    fn default() -> Self {
        Self::fixed(ResiliencePolicy::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn request(method: Method, url: &str) -> Request {
        Request::new(method, Url::parse(url).unwrap())
    }

    fn selector() -> (PolicySelector, Arc<ResiliencePolicy>, Arc<ResiliencePolicy>) {
        let short = Arc::new(ResiliencePolicy::timeout(Duration::from_secs(10)));
        let long = Arc::new(ResiliencePolicy::timeout(Duration::from_secs(30)));
        let selector = PolicySelector::new(long.clone())
            .when(RequestPredicate::Method(Method::GET), short.clone());
        (selector, short, long)
    }

    #[test]
    fn get_routes_to_short_timeout_policy() {
        let (selector, short, long) = selector();

        let get = request(Method::GET, "https://svc.test/items");
        let post = request(Method::POST, "https://svc.test/items");

        assert!(Arc::ptr_eq(selector.select(&get), &short));
        assert!(Arc::ptr_eq(selector.select(&post), &long));
    }

    #[test]
    fn selection_is_deterministic() {
        let (selector, short, _) = selector();
        let get = request(Method::GET, "https://svc.test/items");

        for _ in 0..10 {
            assert!(Arc::ptr_eq(selector.select(&get), &short));
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let a = Arc::new(ResiliencePolicy::new());
        let b = Arc::new(ResiliencePolicy::new());
        let selector = PolicySelector::fixed(ResiliencePolicy::new())
            .when(RequestPredicate::PathPrefix("/admin".into()), a.clone())
            .when(RequestPredicate::Method(Method::GET), b.clone());

        let get_admin = request(Method::GET, "https://svc.test/admin/users");
        assert!(Arc::ptr_eq(selector.select(&get_admin), &a));
    }

    #[test]
    fn conjunction_predicate() {
        let predicate = RequestPredicate::All(vec![
            RequestPredicate::Method(Method::GET),
            RequestPredicate::PathPrefix("/v2".into()),
        ]);

        assert!(predicate.matches(&request(Method::GET, "https://svc.test/v2/items")));
        assert!(!predicate.matches(&request(Method::POST, "https://svc.test/v2/items")));
        assert!(!predicate.matches(&request(Method::GET, "https://svc.test/v1/items")));
    }

    #[test]
    fn header_predicates() {
        let mut req = request(Method::GET, "https://svc.test/items");
        req.headers_mut()
            .insert("x-api-key", "secret".parse().unwrap());

        assert!(RequestPredicate::HasHeader("x-api-key".into()).matches(&req));
        assert!(
            RequestPredicate::HeaderEquals {
                name: "x-api-key".into(),
                value: "secret".into()
            }
            .matches(&req)
        );
        assert!(!RequestPredicate::HasHeader("authorization".into()).matches(&req));
    }
}
