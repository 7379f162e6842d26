//! Keyed registry of shared resilience policies.

use crate::{HttpClientError, ResiliencePolicy, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-wide store of named resilience policies.
///
/// Populated once at startup, read-only afterwards. Entries are shared
/// `Arc`s: two clients referencing the same key share one policy instance,
/// including any circuit breaker state embedded in it.
#[derive(Default)]
pub struct PolicyRegistry {
    entries: RwLock<HashMap<String, Arc<ResiliencePolicy>>>,
}

impl PolicyRegistry {
    /// Create an empty policy registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under a key. Fails on key collision.
    pub fn register(&self, key: impl Into<String>, policy: ResiliencePolicy) -> Result<()> {
        self.register_shared(key, Arc::new(policy))
    }

    /// Register an already-shared policy under a key.
    pub fn register_shared(
        &self,
        key: impl Into<String>,
        policy: Arc<ResiliencePolicy>,
    ) -> Result<()> {
        let key = key.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(HttpClientError::DuplicateKey(key));
        }
        debug!(key = %key, "Policy registered");
        entries.insert(key, policy);
        Ok(())
    }

    /// Look up a policy by key.
    pub fn lookup(&self, key: &str) -> Result<Arc<ResiliencePolicy>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| HttpClientError::UnknownPolicy(key.to_string()))
    }

    /// Check whether a key is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duplicate_key_is_rejected() {
        let registry = PolicyRegistry::new();
        registry
            .register("regular", ResiliencePolicy::timeout(Duration::from_secs(10)))
            .unwrap();

        let err = registry
            .register("regular", ResiliencePolicy::timeout(Duration::from_secs(30)))
            .unwrap_err();
        assert!(matches!(err, HttpClientError::DuplicateKey(key) if key == "regular"));
    }

    #[test]
    fn unknown_key_errors() {
        let registry = PolicyRegistry::new();
        let err = registry.lookup("long").unwrap_err();
        assert!(matches!(err, HttpClientError::UnknownPolicy(key) if key == "long"));
    }

    #[test]
    fn lookups_share_one_instance() {
        let registry = PolicyRegistry::new();
        registry
            .register("regular", ResiliencePolicy::timeout(Duration::from_secs(10)))
            .unwrap();

        let a = registry.lookup("regular").unwrap();
        let b = registry.lookup("regular").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
