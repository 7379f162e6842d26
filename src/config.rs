//! Per-client base configuration.

use crate::{HttpClientError, Result};
use http::{HeaderName, HeaderValue};
use std::time::Duration;
use url::Url;

/// Base configuration for a registered client.
///
/// Resilience behavior is not configured here; it attaches through
/// [`ResiliencePolicy`](crate::ResiliencePolicy) and the policy selector at
/// registration time.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL joined with relative request paths.
    pub base_url: Option<String>,
    /// Default headers applied to every request (unless already set).
    pub default_headers: Vec<(String, String)>,
    /// Transport-level request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Connection pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip decompression.
    pub gzip: bool,
    /// Enable brotli decompression.
    pub brotli: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: Vec::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            user_agent: format!("hardpoint/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validate the configuration at registration time, so pipeline builds
    /// cannot fail later on malformed URLs or headers.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(base) = &self.base_url {
            Url::parse(base).map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
        }
        for (name, value) in &self.default_headers {
            HeaderName::try_from(name.as_str()).map_err(|_| {
                HttpClientError::Configuration(format!("invalid default header name: {name}"))
            })?;
            HeaderValue::try_from(value.as_str()).map_err(|_| {
                HttpClientError::Configuration(format!("invalid default header value for {name}"))
            })?;
        }
        Ok(())
    }
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the base URL for all requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Add a default header applied to every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Set the transport-level request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip decompression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable brotli decompression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.config.brotli = enable;
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = ClientConfig::builder()
            .base_url("https://api.github.com/")
            .default_header("Accept", "application/vnd.github.v3+json")
            .default_header("User-Agent", "hardpoint-sample")
            .timeout(Duration::from_secs(60))
            .build();

        assert_eq!(config.base_url.as_deref(), Some("https://api.github.com/"));
        assert_eq!(config.default_headers.len(), 2);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let config = ClientConfig::builder().base_url("not a url").build();
        assert!(matches!(
            config.validate(),
            Err(HttpClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_default_header() {
        let config = ClientConfig::builder()
            .default_header("bad header name", "value")
            .build();
        assert!(matches!(
            config.validate(),
            Err(HttpClientError::Configuration(_))
        ));
    }
}
