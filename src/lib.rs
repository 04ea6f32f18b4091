// Keystone - A NestJS-inspired application bootstrap runtime for Rust
//
// This library wires a module graph onto an HTTP server: body parsing,
// global prefix routing, lifecycle hooks and optional WebSocket and
// microservice subsystems.

// Re-export core functionality
pub use keystone_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application,
        ApplicationOptions,
        CapabilityResolver,
        Component,
        Controller,
        Error,
        HttpAdapter,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Middleware,
        Module,
        ModuleContainer,
        Next,
        OnModuleDestroy,
        OnModuleInit,
        Route,
        Router,
        register_capability,
    };
}
