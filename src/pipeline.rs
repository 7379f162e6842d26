//! Pipeline composition: middleware chain, policy selection, transport.

use crate::middleware::{Middleware, Next};
use crate::{ClientConfig, PolicySelector, Request, Response, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tracing::debug;

/// An immutable composition of middleware, policy selection, and transport.
///
/// Built once per registered client and reused for every request issued
/// through it. Requests flow outer-to-inner through the middleware chain,
/// then through the selected resilience policy, then to the transport.
pub struct Pipeline {
    config: ClientConfig,
    default_headers: HeaderMap,
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: Terminal,
}

impl Pipeline {
    /// Send a request through the pipeline.
    pub async fn send(&self, mut request: Request) -> Result<Response> {
        for (name, value) in &self.default_headers {
            if !request.headers().contains_key(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }

        Next::new(&self.middlewares, &self.terminal)
            .run(request)
            .await
    }

    /// The base configuration this pipeline was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Terminal stage of the chain: pick a policy for the request, then execute
/// the transport send under it.
pub(crate) struct Terminal {
    selector: PolicySelector,
    transport: Transport,
}

impl Terminal {
    pub(crate) async fn send(&self, request: Request) -> Result<Response> {
        // Selection runs fresh per request, never cached
        let policy = self.selector.select(&request).clone();
        policy
            .execute(request, |req| self.transport.send(req))
            .await
    }
}

/// Transport-level sender backed by reqwest.
struct Transport {
    client: reqwest::Client,
}

impl Transport {
    async fn send(&self, request: Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        let response = self.client.execute(builder.build()?).await?;
        Ok(Response::from_reqwest(response).await)
    }
}

/// Composes an ordered middleware chain and a policy-wrapped transport into
/// a single [`Pipeline`].
pub struct PipelineBuilder {
    config: ClientConfig,
    middlewares: Vec<Arc<dyn Middleware>>,
    selector: PolicySelector,
}

impl PipelineBuilder {
    /// Start a pipeline from a client configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            middlewares: Vec::new(),
            selector: PolicySelector::default(),
        }
    }

    /// Append a middleware to the chain. Order is significant.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append an already-shared middleware to the chain.
    pub fn middleware_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Set the policy selector for the terminal stage.
    pub fn selector(mut self, selector: PolicySelector) -> Self {
        self.selector = selector;
        self
    }

    /// Build the pipeline, constructing the underlying transport.
    pub fn build(self) -> Pipeline {
        let config = &self.config;
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        if config.gzip {
            builder = builder.gzip(true);
        }
        if config.brotli {
            builder = builder.brotli(true);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let client = builder.build().expect("Failed to build HTTP client");

        // Header values were validated at registration; skip any stragglers
        let default_headers = config
            .default_headers
            .iter()
            .filter_map(|(name, value)| {
                let name = HeaderName::try_from(name.as_str()).ok()?;
                let value = HeaderValue::try_from(value.as_str()).ok()?;
                Some((name, value))
            })
            .collect::<HeaderMap>();

        debug!(
            base_url = config.base_url.as_deref().unwrap_or("<none>"),
            middlewares = self.middlewares.len(),
            "Pipeline built"
        );

        Pipeline {
            config: self.config,
            default_headers,
            middlewares: self.middlewares,
            terminal: Terminal {
                selector: self.selector,
                transport: Transport { client },
            },
        }
    }
}
