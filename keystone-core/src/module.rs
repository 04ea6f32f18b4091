//! Modules of the resolved application graph.
//!
//! A [`Module`] groups the live instances the runtime drives: `routes` holds
//! controllers, `components` holds every other provider. Instances are
//! type-erased as [`Component`]; what the runtime does with one depends only
//! on the capabilities it reports.
//!
//! ```
//! use keystone_core::{Component, Module, OnModuleInit, LifecycleResult};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! #[async_trait]
//! impl OnModuleInit for Database {
//!     async fn on_module_init(&self) -> LifecycleResult {
//!         Ok(())
//!     }
//! }
//!
//! impl Component for Database {
//!     fn as_init_hook(&self) -> Option<&dyn OnModuleInit> {
//!         Some(self)
//!     }
//! }
//!
//! let module = Module::new("DatabaseModule").provider("Database", Arc::new(Database));
//! assert_eq!(module.instances().count(), 1);
//! ```

use crate::{Controller, Middleware, OnModuleDestroy, OnModuleInit};
use std::any::Any;
use std::sync::Arc;

/// A live instance in the module graph.
///
/// Each query method returns `Some` only when the type implements that
/// capability.
pub trait Component: Any + Send + Sync {
    fn as_init_hook(&self) -> Option<&dyn OnModuleInit> {
        None
    }

    fn as_destroy_hook(&self) -> Option<&dyn OnModuleDestroy> {
        None
    }

    fn as_controller(&self) -> Option<&dyn Controller> {
        None
    }
}

/// A registered token and its instance, if one has been created
#[derive(Clone)]
pub struct InstanceWrapper {
    pub token: String,
    pub instance: Option<Arc<dyn Component>>,
}

impl InstanceWrapper {
    pub fn new(token: impl Into<String>, instance: Arc<dyn Component>) -> Self {
        Self {
            token: token.into(),
            instance: Some(instance),
        }
    }

    /// A token whose instance was never created
    pub fn pending(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            instance: None,
        }
    }
}

impl std::fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("token", &self.token)
            .field("resolved", &self.instance.is_some())
            .finish()
    }
}

/// One module of the application graph
#[derive(Clone)]
pub struct Module {
    pub name: String,
    pub routes: Vec<InstanceWrapper>,
    pub components: Vec<InstanceWrapper>,
    /// Middleware the module applies to every route
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            components: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Register a controller instance
    pub fn controller(mut self, token: impl Into<String>, instance: Arc<dyn Component>) -> Self {
        self.routes.push(InstanceWrapper::new(token, instance));
        self
    }

    /// Register a provider instance
    pub fn provider(mut self, token: impl Into<String>, instance: Arc<dyn Component>) -> Self {
        self.components.push(InstanceWrapper::new(token, instance));
        self
    }

    /// Register a provider token with no live instance
    pub fn pending_provider(mut self, token: impl Into<String>) -> Self {
        self.components.push(InstanceWrapper::pending(token));
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Live instances: routes first, then components, in declaration order
    pub fn instances(&self) -> impl Iterator<Item = (&str, &Arc<dyn Component>)> {
        self.routes
            .iter()
            .chain(self.components.iter())
            .filter_map(|wrapper| {
                wrapper
                    .instance
                    .as_ref()
                    .map(|instance| (wrapper.token.as_str(), instance))
            })
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("routes", &self.routes)
            .field("components", &self.components)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Component for Plain {}

    #[test]
    fn test_instances_order_and_pending() {
        let module = Module::new("UsersModule")
            .provider("UsersService", Arc::new(Plain))
            .pending_provider("LazyRepo")
            .controller("UsersController", Arc::new(Plain));

        let tokens: Vec<&str> = module.instances().map(|(token, _)| token).collect();
        assert_eq!(tokens, vec!["UsersController", "UsersService"]);
        assert_eq!(module.components.len(), 2);
    }

    #[test]
    fn test_default_capabilities_absent() {
        let plain = Plain;
        assert!(plain.as_init_hook().is_none());
        assert!(plain.as_destroy_hook().is_none());
        assert!(plain.as_controller().is_none());
    }
}
