//! Client registry: named and typed client registration and resolution.

use crate::middleware::Middleware;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::{
    ClientConfig, HttpClient, HttpClientError, PolicySelector, ResiliencePolicy, Result,
};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// A service type backed by a registered client pipeline.
///
/// ```
/// use hardpoint::{HttpClient, TypedClient};
///
/// struct IssuesService {
///     client: HttpClient,
/// }
///
/// impl TypedClient for IssuesService {
///     fn from_client(client: HttpClient) -> Self {
///         Self { client }
///     }
/// }
/// ```
pub trait TypedClient: Send + Sync + 'static {
    /// Construct the service wrapper around its resolved client.
    fn from_client(client: HttpClient) -> Self;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ClientKey {
    Name(String),
    Type(TypeId),
}

struct ClientDescriptor {
    label: String,
    config: ClientConfig,
    middlewares: Vec<Arc<dyn Middleware>>,
    selector: PolicySelector,
    pipeline: OnceLock<Arc<Pipeline>>,
}

/// Registration parameters for a client: base config, ordered middleware,
/// and the resilience policy (fixed or conditional).
pub struct ClientRegistration {
    config: ClientConfig,
    middlewares: Vec<Arc<dyn Middleware>>,
    selector: PolicySelector,
}

impl ClientRegistration {
    /// Start a registration from a base configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            middlewares: Vec::new(),
            selector: PolicySelector::default(),
        }
    }

    /// Append a middleware. Order is significant.
    pub fn middleware<M: Middleware + 'static>(self, middleware: M) -> Self {
        self.middleware_shared(Arc::new(middleware))
    }

    /// Append an already-shared middleware.
    pub fn middleware_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Attach a fixed resilience policy.
    pub fn policy(mut self, policy: ResiliencePolicy) -> Self {
        self.selector = PolicySelector::fixed(policy);
        self
    }

    /// Attach a shared policy (typically looked up from a
    /// [`PolicyRegistry`](crate::PolicyRegistry)).
    pub fn shared_policy(mut self, policy: Arc<ResiliencePolicy>) -> Self {
        self.selector = PolicySelector::fixed_shared(policy);
        self
    }

    /// Attach a conditional policy selector.
    pub fn selector(mut self, selector: PolicySelector) -> Self {
        self.selector = selector;
        self
    }

    fn into_descriptor(self, label: String) -> ClientDescriptor {
        ClientDescriptor {
            label,
            config: self.config,
            middlewares: self.middlewares,
            selector: self.selector,
            pipeline: OnceLock::new(),
        }
    }
}

impl From<ClientConfig> for ClientRegistration {
    fn from(config: ClientConfig) -> Self {
        Self::new(config)
    }
}

/// Process-wide registry mapping names and service types to client pipelines.
///
/// Registration is a one-time startup phase; afterwards descriptors are
/// read-only and safely shared. Pipelines are built lazily on first
/// resolution and cached for the process lifetime; concurrent first
/// resolutions for the same identity construct exactly one pipeline.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientKey, Arc<ClientDescriptor>>>,
}

impl ClientRegistry {
    /// Create an empty client registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named client. Fails if the name is taken or the
    /// configuration is invalid.
    pub fn register_named(
        &self,
        name: impl Into<String>,
        registration: impl Into<ClientRegistration>,
    ) -> Result<()> {
        let name = name.into();
        self.insert(ClientKey::Name(name.clone()), name, registration.into())
    }

    /// Register a typed client for service type `T`.
    pub fn register_typed<T: TypedClient>(
        &self,
        registration: impl Into<ClientRegistration>,
    ) -> Result<()> {
        let label = std::any::type_name::<T>().to_string();
        self.insert(
            ClientKey::Type(TypeId::of::<T>()),
            label,
            registration.into(),
        )
    }

    /// Resolve a named client.
    pub fn client(&self, name: &str) -> Result<HttpClient> {
        let descriptor = self
            .clients
            .read()
            .get(&ClientKey::Name(name.to_string()))
            .cloned()
            .ok_or_else(|| HttpClientError::UnknownClient(name.to_string()))?;
        Ok(HttpClient::new(Self::pipeline_for(&descriptor)))
    }

    /// Resolve a typed client, constructing the service wrapper around the
    /// cached pipeline.
    pub fn typed<T: TypedClient>(&self) -> Result<T> {
        let descriptor = self
            .clients
            .read()
            .get(&ClientKey::Type(TypeId::of::<T>()))
            .cloned()
            .ok_or_else(|| {
                HttpClientError::UnknownClient(std::any::type_name::<T>().to_string())
            })?;
        Ok(T::from_client(HttpClient::new(Self::pipeline_for(
            &descriptor,
        ))))
    }

    fn insert(
        &self,
        key: ClientKey,
        label: String,
        registration: ClientRegistration,
    ) -> Result<()> {
        registration.config.validate()?;
        let mut clients = self.clients.write();
        if clients.contains_key(&key) {
            return Err(HttpClientError::DuplicateRegistration(label));
        }
        debug!(client = %label, "Client registered");
        clients.insert(key, Arc::new(registration.into_descriptor(label)));
        Ok(())
    }

    /// Build-once pipeline access. `OnceLock` blocks racing initializers, so
    /// concurrent first resolutions observe a single construction.
    fn pipeline_for(descriptor: &ClientDescriptor) -> Arc<Pipeline> {
        descriptor
            .pipeline
            .get_or_init(|| {
                debug!(client = %descriptor.label, "Building pipeline on first resolution");
                let mut builder = PipelineBuilder::new(descriptor.config.clone())
                    .selector(descriptor.selector.clone());
                for middleware in &descriptor.middlewares {
                    builder = builder.middleware_shared(middleware.clone());
                }
                Arc::new(builder.build())
            })
            .clone()
    }
}
