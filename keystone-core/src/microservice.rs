//! Microservice transports attached to an application.
//!
//! A microservice is an extra server sharing the application's module graph
//! but listening on a non-HTTP transport. Its implementation is an optional
//! capability: [`MicroserviceFactory`] under
//! [`MICROSERVICE_SERVER`](crate::MICROSERVICE_SERVER) constructs instances,
//! and [`MicroservicesModule`] under
//! [`MICROSERVICES_MODULE`](crate::MICROSERVICES_MODULE) wires handlers and
//! clients during initialization.

use crate::logging::{debug, error, info};
use crate::{ApplicationConfig, Capability, Error, ModuleContainer};
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Transport a microservice listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Redis,
    Nats,
    Mqtt,
    Grpc,
}

/// Per-instance configuration handed to the transport server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroserviceOptions {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    /// Transport-specific settings
    pub options: serde_json::Value,
}

impl MicroserviceOptions {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set one transport-specific option
    pub fn option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if !self.options.is_object() {
            self.options = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.options.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

impl Default for MicroserviceOptions {
    fn default() -> Self {
        Self {
            transport: Transport::Tcp,
            host: "localhost".to_string(),
            port: 3000,
            options: serde_json::Value::Null,
        }
    }
}

/// A secondary transport server.
///
/// Implementations use interior mutability for their flags; the registry
/// sets them and the server reads them.
#[async_trait]
pub trait Microservice: Send + Sync {
    /// Bind message handlers from the module graph
    fn setup_listeners(&self) -> Result<(), Error>;

    /// Start listening; resolves once the server is ready
    async fn listen(&self) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;

    fn set_is_initialized(&self, value: bool);

    fn set_is_init_hook_called(&self, value: bool);

    fn set_is_terminated(&self, value: bool);
}

/// Constructs microservice instances
pub trait MicroserviceFactory: Send + Sync {
    fn create(
        &self,
        container: Arc<ModuleContainer>,
        options: MicroserviceOptions,
    ) -> Result<Arc<dyn Microservice>, Error>;
}

/// Microservice support for the module graph
#[async_trait]
pub trait MicroservicesModule: Send + Sync {
    async fn setup(
        &self,
        container: Arc<ModuleContainer>,
        config: Arc<ApplicationConfig>,
    ) -> Result<(), Error>;

    /// Set up the clients the graph uses to reach other services
    async fn setup_clients(&self, container: Arc<ModuleContainer>) -> Result<(), Error>;
}

/// Microservices attached to one application, in attach order
pub struct MicroserviceRegistry {
    factory: Capability<Arc<dyn MicroserviceFactory>>,
    instances: RwLock<Vec<Arc<dyn Microservice>>>,
}

impl MicroserviceRegistry {
    pub fn new(factory: Capability<Arc<dyn MicroserviceFactory>>) -> Self {
        Self {
            factory,
            instances: RwLock::new(Vec::new()),
        }
    }

    /// Create, prepare and attach a microservice.
    ///
    /// Fails with [`Error::CapabilityNotFound`] when no transport server is
    /// installed; the registry is left untouched on any failure.
    pub fn connect(
        &self,
        container: Arc<ModuleContainer>,
        options: MicroserviceOptions,
    ) -> Result<Arc<dyn Microservice>, Error> {
        let factory = self.factory.require()?;
        let transport = options.transport;
        let instance = factory.create(container, options)?;

        instance.setup_listeners()?;
        instance.set_is_initialized(true);
        instance.set_is_init_hook_called(true);

        let mut instances = self.instances.write();
        instances.push(instance.clone());
        debug!(?transport, attached = instances.len(), "Microservice connected");
        Ok(instance)
    }

    /// Snapshot of the attached microservices
    pub fn microservices(&self) -> Vec<Arc<dyn Microservice>> {
        self.instances.read().clone()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Start every microservice concurrently and wait for all of them.
    ///
    /// A failing instance doesn't stop the others; every failure is returned
    /// in [`Error::MicroservicesFailed`].
    pub async fn start_all(&self) -> Result<(), Error> {
        let instances = self.microservices();
        info!(count = instances.len(), "Starting microservices");

        let results = join_all(instances.iter().map(|instance| instance.listen())).await;
        let failures: Vec<Error> = results.into_iter().filter_map(Result::err).collect();

        if failures.is_empty() {
            info!(count = instances.len(), "All microservices are listening");
            Ok(())
        } else {
            for failure in &failures {
                error!(error = %failure, "Microservice failed to start");
            }
            Err(Error::MicroservicesFailed(failures))
        }
    }

    /// Mark each microservice terminated and close it, in attach order.
    /// Stops at the first failure.
    pub async fn close_all(&self) -> Result<(), Error> {
        for instance in self.microservices() {
            instance.set_is_terminated(true);
            instance.close().await?;
        }
        debug!("Microservices closed");
        Ok(())
    }
}
