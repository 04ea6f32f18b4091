// Core library for the Keystone application runtime
// Module graph, HTTP plumbing, optional subsystems and the bootstrap orchestrator

pub mod adapter;
pub mod application;
pub mod body_parser;
pub mod capability;
pub mod config;
pub mod container;
pub mod error;
pub mod exception_filter;
pub mod guard;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod logging;
pub mod microservice;
pub mod middleware;
pub mod middleware_module;
pub mod module;
pub mod options;
pub mod pipe;
pub mod routes_resolver;
pub mod routing;
pub mod server;
pub mod traits;
pub mod websocket;

// Re-export commonly used types
pub use adapter::*;
pub use application::*;
pub use body_parser::{
    install_body_parsers, JsonBodyParser, UrlEncodedBodyParser, DEFAULT_BODY_LIMIT,
    DEFAULT_FORM_DEPTH, DEFAULT_PARAMETER_LIMIT,
};
pub use capability::*;
pub use config::*;
pub use container::*;
pub use error::*;
pub use exception_filter::*;
pub use guard::*;
pub use http::*;
pub use interceptor::*;
pub use lifecycle::*;
pub use microservice::*;
pub use middleware::*;
pub use middleware_module::*;
pub use module::*;
pub use options::*;
pub use pipe::*;
pub use routes_resolver::*;
pub use routing::{handler_fn, join_paths, validate_path, HandlerFn, HandlerFuture, Route, Router};
pub use server::*;
pub use traits::*;
pub use websocket::*;

// Used by `register_capability!`
pub use inventory;
