//! Optional subsystem discovery.
//!
//! WebSocket and microservice support live outside the core. A crate that
//! provides one registers a factory under a well-known name with
//! [`register_capability!`]; the application looks the name up when it is
//! built and gets a [`Capability`] back, which is either the installed handle
//! or an explicit absence marker. Lookup never fails.
//!
//! ```ignore
//! use keystone_core::{register_capability, SocketModule, SOCKET_MODULE};
//! use std::sync::Arc;
//!
//! register_capability!(SOCKET_MODULE, Arc<dyn SocketModule>, Arc::new(GatewayModule::new()));
//! ```

use crate::logging::{debug, trace};
use crate::Error;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// WebSocket gateway module (`Arc<dyn SocketModule>`)
pub const SOCKET_MODULE: &str = "websockets/socket-module";
/// Default WebSocket adapter factory (`Arc<dyn IoAdapterFactory>`)
pub const IO_ADAPTER: &str = "websockets/io-adapter";
/// Microservice module (`Arc<dyn MicroservicesModule>`)
pub const MICROSERVICES_MODULE: &str = "microservices/microservices-module";
/// Microservice server constructor (`Arc<dyn MicroserviceFactory>`)
pub const MICROSERVICE_SERVER: &str = "microservices/microservice-server";

/// Result of looking up an optional subsystem
#[derive(Clone)]
pub enum Capability<T> {
    Present(T),
    /// Not installed; carries the name that was looked up
    Absent(&'static str),
}

impl<T> Capability<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Capability::Present(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Capability::Present(value) => Some(value),
            Capability::Absent(_) => None,
        }
    }

    /// The handle, or [`Error::CapabilityNotFound`] naming what is missing
    pub fn require(&self) -> Result<&T, Error> {
        match self {
            Capability::Present(value) => Ok(value),
            Capability::Absent(name) => Err(Error::CapabilityNotFound((*name).to_string())),
        }
    }
}

impl<T> std::fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Present(_) => f.write_str("Present"),
            Capability::Absent(name) => write!(f, "Absent({})", name),
        }
    }
}

/// Factory registered at link time
pub struct CapabilityEntry {
    pub name: &'static str,
    pub factory: fn() -> Arc<dyn Any + Send + Sync>,
}

inventory::collect!(CapabilityEntry);

impl CapabilityEntry {
    pub const fn new(name: &'static str, factory: fn() -> Arc<dyn Any + Send + Sync>) -> Self {
        Self { name, factory }
    }
}

/// Register an optional subsystem under a well-known name.
///
/// `$handle` is the handle type consumers resolve (for example
/// `Arc<dyn SocketModule>`); `$ctor` builds it.
#[macro_export]
macro_rules! register_capability {
    ($name:expr, $handle:ty, $ctor:expr) => {
        $crate::inventory::submit! {
            $crate::CapabilityEntry::new($name, || {
                let handle: $handle = $ctor;
                ::std::sync::Arc::new(handle)
                    as ::std::sync::Arc<dyn ::std::any::Any + Send + Sync>
            })
        }
    };
}

/// Looks up optional subsystems by name
#[derive(Default)]
pub struct CapabilityResolver {
    installed: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl CapabilityResolver {
    /// An empty resolver; every lookup is absent
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every capability registered with [`register_capability!`]
    pub fn discover() -> Self {
        let mut resolver = Self::new();
        for entry in inventory::iter::<CapabilityEntry> {
            trace!(capability = entry.name, "Discovered capability");
            resolver.installed.insert(entry.name, (entry.factory)());
        }
        resolver
    }

    /// Install a handle explicitly, replacing any discovered one
    pub fn provide<T: Any + Send + Sync>(mut self, name: &'static str, handle: T) -> Self {
        self.installed.insert(name, Arc::new(handle));
        self
    }

    /// Look up `name` as a handle of type `T`.
    ///
    /// A name installed with a different handle type counts as absent.
    pub fn resolve<T: Any + Clone>(&self, name: &'static str) -> Capability<T> {
        match self
            .installed
            .get(name)
            .and_then(|handle| handle.downcast_ref::<T>())
        {
            Some(handle) => {
                debug!(capability = name, "Optional capability present");
                Capability::Present(handle.clone())
            }
            None => {
                debug!(capability = name, "Optional capability absent");
                Capability::Absent(name)
            }
        }
    }
}
