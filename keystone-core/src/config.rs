// Shared application configuration

use crate::{ExceptionFilter, Guard, Interceptor, PipeTransform, WebSocketAdapter};
use parking_lot::RwLock;
use std::sync::Arc;

/// Configuration shared between the application and its subsystems.
///
/// The application holds the only writer: the setters are crate-private and
/// reached through [`Application`](crate::Application). Everyone else reads
/// snapshots. The four global lists only ever grow, in call order.
#[derive(Default)]
pub struct ApplicationConfig {
    global_prefix: RwLock<String>,
    io_adapter: RwLock<Option<Arc<dyn WebSocketAdapter>>>,
    global_filters: RwLock<Vec<Arc<dyn ExceptionFilter>>>,
    global_pipes: RwLock<Vec<Arc<dyn PipeTransform>>>,
    global_interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
    global_guards: RwLock<Vec<Arc<dyn Guard>>>,
}

impl ApplicationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global_prefix(&self) -> String {
        self.global_prefix.read().clone()
    }

    pub fn io_adapter(&self) -> Option<Arc<dyn WebSocketAdapter>> {
        self.io_adapter.read().clone()
    }

    pub fn global_filters(&self) -> Vec<Arc<dyn ExceptionFilter>> {
        self.global_filters.read().clone()
    }

    pub fn global_pipes(&self) -> Vec<Arc<dyn PipeTransform>> {
        self.global_pipes.read().clone()
    }

    pub fn global_interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
        self.global_interceptors.read().clone()
    }

    pub fn global_guards(&self) -> Vec<Arc<dyn Guard>> {
        self.global_guards.read().clone()
    }

    pub(crate) fn set_global_prefix(&self, prefix: impl Into<String>) {
        *self.global_prefix.write() = prefix.into();
    }

    pub(crate) fn set_io_adapter(&self, adapter: Arc<dyn WebSocketAdapter>) {
        *self.io_adapter.write() = Some(adapter);
    }

    pub(crate) fn add_global_filters(&self, filters: Vec<Arc<dyn ExceptionFilter>>) {
        self.global_filters.write().extend(filters);
    }

    pub(crate) fn add_global_pipes(&self, pipes: Vec<Arc<dyn PipeTransform>>) {
        self.global_pipes.write().extend(pipes);
    }

    pub(crate) fn add_global_interceptors(&self, interceptors: Vec<Arc<dyn Interceptor>>) {
        self.global_interceptors.write().extend(interceptors);
    }

    pub(crate) fn add_global_guards(&self, guards: Vec<Arc<dyn Guard>>) {
        self.global_guards.write().extend(guards);
    }
}

impl std::fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("global_prefix", &*self.global_prefix.read())
            .field(
                "io_adapter",
                &self.io_adapter.read().as_ref().map(|adapter| adapter.name().to_string()),
            )
            .field("global_filters", &self.global_filters.read().len())
            .field("global_pipes", &self.global_pipes.read().len())
            .field("global_interceptors", &self.global_interceptors.read().len())
            .field("global_guards", &self.global_guards.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnGuard, FnPipe};

    #[test]
    fn test_lists_append_in_call_order() {
        let config = ApplicationConfig::new();
        let allow: Arc<dyn Guard> = Arc::new(FnGuard::new(|_| Ok(true)));
        let deny: Arc<dyn Guard> = Arc::new(FnGuard::new(|_| Ok(false)));

        config.add_global_guards(vec![allow.clone()]);
        config.add_global_pipes(vec![Arc::new(FnPipe::new(Ok))]);
        config.add_global_guards(vec![deny.clone(), allow.clone()]);

        let guards = config.global_guards();
        assert_eq!(guards.len(), 3);
        assert!(Arc::ptr_eq(&guards[0], &allow));
        assert!(Arc::ptr_eq(&guards[1], &deny));
        assert!(Arc::ptr_eq(&guards[2], &allow));
        assert_eq!(config.global_pipes().len(), 1);
    }

    #[test]
    fn test_prefix_replaced() {
        let config = ApplicationConfig::new();
        assert_eq!(config.global_prefix(), "");
        config.set_global_prefix("api");
        config.set_global_prefix("v2");
        assert_eq!(config.global_prefix(), "v2");
        assert!(config.io_adapter().is_none());
    }
}
