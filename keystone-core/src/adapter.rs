// HTTP adapter: application-wide middleware stack plus mounted routers

use crate::logging::debug;
use crate::routing::split_query;
use crate::{
    Error, HandlerFn, HandlerFuture, HttpRequest, HttpResponse, Middleware, MiddlewareChain, Router,
};
use parking_lot::RwLock;
use std::sync::Arc;

struct Mount {
    prefix: String,
    router: Arc<Router>,
}

/// The request-handling surface the HTTP server drives.
///
/// Middleware registered with [`HttpAdapter::use_middleware`] runs for every
/// request in registration order, before the request reaches a mounted
/// router. Routers are tried in mount order.
pub struct HttpAdapter {
    middleware: RwLock<MiddlewareChain>,
    mounts: RwLock<Arc<Vec<Mount>>>,
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            middleware: RwLock::new(MiddlewareChain::new()),
            mounts: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Create an empty router for later mounting
    pub fn create_router() -> Router {
        Router::new()
    }

    /// Register application-wide middleware
    pub fn use_middleware<M: Middleware + 'static>(&self, middleware: M) {
        self.middleware.write().use_middleware(middleware);
    }

    /// Register shared application-wide middleware
    pub fn use_middleware_arc(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.write().push(middleware);
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.read().len()
    }

    /// Mount a router under an already-normalized prefix (`/` mounts at the root)
    pub fn mount(&self, prefix: &str, router: Router) {
        debug!(prefix = prefix, routes = router.routes.len(), "Mounting router");
        let mut mounts = self.mounts.write();
        let mut updated: Vec<Mount> = mounts
            .iter()
            .map(|mount| Mount {
                prefix: mount.prefix.clone(),
                router: mount.router.clone(),
            })
            .collect();
        updated.push(Mount {
            prefix: prefix.to_string(),
            router: Arc::new(router),
        });
        *mounts = Arc::new(updated);
    }

    /// Full paths of every mounted route, in mount then declaration order
    pub fn route_paths(&self) -> Vec<String> {
        let mounts = self.mounts.read().clone();
        mounts
            .iter()
            .flat_map(|mount| {
                mount
                    .router
                    .routes
                    .iter()
                    .map(|route| mounted_path(&mount.prefix, &route.path))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Run a request through the middleware stack and the mounted routers
    pub async fn handle(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        let chain = self.middleware.read().clone();
        let mounts = self.mounts.read().clone();

        let dispatch: HandlerFn = Arc::new(move |req: HttpRequest| -> HandlerFuture {
            let mounts = mounts.clone();
            Box::pin(async move { dispatch(&mounts, req).await })
        });

        chain.apply(req, dispatch).await
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch(mounts: &[Mount], mut req: HttpRequest) -> Result<HttpResponse, Error> {
    let (path, query) = split_query(&req.path);
    let path = path.to_string();
    let query = query.map(str::to_string);

    for mount in mounts {
        let Some(rest) = strip_mount(&mount.prefix, &path) else {
            continue;
        };
        if !mount.router.has_route(&req.method, rest) {
            continue;
        }

        req.path = match &query {
            Some(query) => format!("{}?{}", rest, query),
            None => rest.to_string(),
        };
        return mount.router.route(req).await;
    }

    Err(Error::RouteNotFound(format!("{} {}", req.method, path)))
}

fn strip_mount<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn mounted_path(prefix: &str, route_path: &str) -> String {
    match (prefix, route_path) {
        ("/", path) => path.to_string(),
        (prefix, "/") => prefix.to_string(),
        (prefix, path) => format!("{}{}", prefix, path),
    }
}
