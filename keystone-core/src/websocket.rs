//! WebSocket subsystem contracts.
//!
//! The gateway implementation is an optional capability. When a crate
//! registers [`SOCKET_MODULE`](crate::SOCKET_MODULE) the application calls
//! [`SocketModule::setup`] during initialization and [`SocketModule::close`]
//! on shutdown. An [`IO_ADAPTER`](crate::IO_ADAPTER) factory, when present,
//! supplies the default [`WebSocketAdapter`] bound to the HTTP server.

use crate::{ApplicationConfig, Error, HttpServer, ModuleContainer};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport adapter used by WebSocket gateways
#[async_trait]
pub trait WebSocketAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Builds the default adapter for an HTTP server
pub trait IoAdapterFactory: Send + Sync {
    fn create(&self, server: &HttpServer) -> Arc<dyn WebSocketAdapter>;
}

/// The WebSocket gateway module
#[async_trait]
pub trait SocketModule: Send + Sync {
    /// Bind gateways found in the module graph, using the configured adapter
    async fn setup(
        &self,
        container: Arc<ModuleContainer>,
        config: Arc<ApplicationConfig>,
    ) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}
