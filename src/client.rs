//! Client handle bound to a pipeline.

use crate::{ClientConfig, Pipeline, Request, RequestBuilder, Response, Result};
use http::Method;
use std::sync::Arc;

/// Handle to a registered client.
///
/// Cheap to clone; every clone shares the same cached [`Pipeline`], so all
/// requests issued through a given identity flow through one composition of
/// middleware, policy selection, and transport.
#[derive(Clone)]
pub struct HttpClient {
    pipeline: Arc<Pipeline>,
}

impl HttpClient {
    pub(crate) fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// The pipeline backing this client.
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// The client's base configuration.
    pub fn config(&self) -> &ClientConfig {
        self.pipeline.config()
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }

    /// Send an already-built request through the pipeline.
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.pipeline.send(request).await
    }
}
