// Routing system for HTTP requests

use crate::logging::trace;
use crate::{Error, HttpMethod, HttpRequest, HttpResponse, Middleware, MiddlewareChain};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future produced by a route handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// A route handler function type
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> HandlerFuture + Send + Sync>;

/// Box an async closure into a [`HandlerFn`]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req: HttpRequest| -> HandlerFuture { Box::pin(f(req)) })
}

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub handler: HandlerFn,
}

impl Route {
    pub fn new<F, Fut>(method: HttpMethod, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            handler: handler_fn(handler),
        }
    }
}

/// Router for managing routes and dispatching requests
///
/// Middleware attached to the router wraps every route it serves.
#[derive(Default)]
pub struct Router {
    pub routes: Vec<Route>,
    middleware: MiddlewareChain,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route to the router
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Attach middleware that runs before any route of this router
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Whether a route matches the method and path (query string excluded)
    pub fn has_route(&self, method: &str, path: &str) -> bool {
        self.routes
            .iter()
            .any(|route| route.method.as_str() == method && match_path(&route.path, path).is_some())
    }

    /// Find a route that matches the request
    pub async fn route(&self, mut request: HttpRequest) -> Result<HttpResponse, Error> {
        let (path, query_string) = split_query(&request.path);
        let path = path.to_string();
        let query_params = query_string.map(parse_query_string);

        if let Some(query_params) = query_params {
            request.query_params = query_params;
        }

        for route in &self.routes {
            if route.method.as_str() != request.method {
                continue;
            }

            if let Some(params) = match_path(&route.path, &path) {
                trace!(method = %request.method, path = %path, "Route matched");
                request.path_params = params;
                return self.middleware.apply(request, route.handler.clone()).await;
            }
        }

        Err(Error::RouteNotFound(format!("{} {}", request.method, path)))
    }
}

/// Normalize a mount path: one leading slash, no trailing or doubled slashes.
///
/// The empty path normalizes to `/`.
pub fn validate_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join two path fragments into one normalized path
pub fn join_paths(base: &str, path: &str) -> String {
    validate_path(&format!("{}/{}", base, path))
}

pub(crate) fn split_query(path: &str) -> (&str, Option<&str>) {
    path.split_once('?')
        .map(|(p, q)| (p, Some(q)))
        .unwrap_or((path, None))
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            params.insert(param_name.to_string(), path_part.to_string());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Parse a query string into a map of parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
