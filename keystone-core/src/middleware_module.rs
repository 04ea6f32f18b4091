// Module-declared middleware registration

use crate::logging::debug;
use crate::{ApplicationConfig, Error, Middleware, ModuleContainer, Router};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Middleware collected from the module graph, tagged with its module
#[derive(Default)]
pub struct MiddlewareContainer {
    entries: RwLock<Vec<(String, Arc<dyn Middleware>)>>,
}

impl MiddlewareContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, module: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.entries.write().push((module.into(), middleware));
    }

    /// Registered middleware in insertion order
    pub fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        self.entries
            .read()
            .iter()
            .map(|(_, middleware)| middleware.clone())
            .collect()
    }

    /// Middleware registered by one module
    pub fn for_module(&self, module: &str) -> Vec<Arc<dyn Middleware>> {
        self.entries
            .read()
            .iter()
            .filter(|(name, _)| name == module)
            .map(|(_, middleware)| middleware.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Registers module middleware and applies it to the application router
#[async_trait]
pub trait MiddlewareSetup: Send + Sync {
    /// Collect middleware declared by the module graph
    async fn setup(
        &self,
        middleware: &MiddlewareContainer,
        container: &ModuleContainer,
        config: &ApplicationConfig,
    ) -> Result<(), Error>;

    /// Attach collected middleware to the router before routes are resolved
    async fn setup_middlewares(
        &self,
        middleware: &MiddlewareContainer,
        router: &mut Router,
    ) -> Result<(), Error>;
}

/// Default setup: every module's `middleware`, in graph order
#[derive(Debug, Default)]
pub struct MiddlewaresModule;

#[async_trait]
impl MiddlewareSetup for MiddlewaresModule {
    async fn setup(
        &self,
        middleware: &MiddlewareContainer,
        container: &ModuleContainer,
        _config: &ApplicationConfig,
    ) -> Result<(), Error> {
        for module in container.modules() {
            for entry in &module.middleware {
                middleware.insert(module.name.clone(), entry.clone());
            }
        }
        debug!(count = middleware.len(), "Module middleware registered");
        Ok(())
    }

    async fn setup_middlewares(
        &self,
        middleware: &MiddlewareContainer,
        router: &mut Router,
    ) -> Result<(), Error> {
        for entry in middleware.middleware() {
            router.use_middleware(entry);
        }
        Ok(())
    }
}
