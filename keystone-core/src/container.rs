// Resolved module graph

use crate::logging::debug;
use crate::Module;
use std::sync::Arc;

/// The module graph an application is built from.
///
/// The graph is complete when handed to the application; the runtime only
/// reads it.
#[derive(Clone, Debug, Default)]
pub struct ModuleContainer {
    modules: Vec<Arc<Module>>,
}

impl ModuleContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module; graph order is insertion order
    pub fn add_module(&mut self, module: Module) {
        debug!(
            module = %module.name,
            routes = module.routes.len(),
            components = module.components.len(),
            "Module registered"
        );
        self.modules.push(Arc::new(module));
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.add_module(module);
        self
    }

    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    /// Find a module by name
    pub fn module(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.iter().find(|module| module.name == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
