//! Lifecycle hooks for components in the module graph.
//!
//! - `OnModuleInit` - called once the application has finished setting up
//!   its subsystems, middleware and routes
//! - `OnModuleDestroy` - called while the application closes
//!
//! Both walks visit modules in graph order and, within a module, controllers
//! before providers, each in declaration order. Pending instances and
//! instances that don't report the hook are skipped. The first failing hook
//! stops the walk and is returned as [`Error::Lifecycle`].

use crate::logging::{debug, error};
use crate::{Component, Error, ModuleContainer};
use async_trait::async_trait;

/// Error type for lifecycle hooks
pub type LifecycleResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Hook called after the application is initialized
#[async_trait]
pub trait OnModuleInit: Send + Sync {
    async fn on_module_init(&self) -> LifecycleResult;
}

/// Hook called when the application closes
#[async_trait]
pub trait OnModuleDestroy: Send + Sync {
    async fn on_module_destroy(&self) -> LifecycleResult;
}

/// Run every `OnModuleInit` hook in the graph
pub async fn call_init_hook(container: &ModuleContainer) -> Result<(), Error> {
    call_hook(container, Hook::Init).await
}

/// Run every `OnModuleDestroy` hook in the graph
pub async fn call_destroy_hook(container: &ModuleContainer) -> Result<(), Error> {
    call_hook(container, Hook::Destroy).await
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Init,
    Destroy,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::Init => "onModuleInit",
            Hook::Destroy => "onModuleDestroy",
        }
    }

    /// `None` when the instance doesn't implement this hook
    async fn call(self, instance: &dyn Component) -> Option<LifecycleResult> {
        match self {
            Hook::Init => Some(instance.as_init_hook()?.on_module_init().await),
            Hook::Destroy => Some(instance.as_destroy_hook()?.on_module_destroy().await),
        }
    }
}

async fn call_hook(container: &ModuleContainer, hook: Hook) -> Result<(), Error> {
    let name = hook.name();
    debug!(hook = name, "Calling module lifecycle hooks");
    let mut called = 0usize;

    for module in container.modules() {
        for (token, instance) in module.instances() {
            let Some(result) = hook.call(instance.as_ref()).await else {
                continue;
            };
            result.map_err(|source| {
                error!(component = token, hook = name, error = %source, "Lifecycle hook failed");
                Error::Lifecycle {
                    component: token.to_string(),
                    hook: name,
                    source,
                }
            })?;
            debug!(module = %module.name, component = token, hook = name, "Hook completed");
            called += 1;
        }
    }

    debug!(hook = name, hooks = called, "Module lifecycle hooks completed");
    Ok(())
}
