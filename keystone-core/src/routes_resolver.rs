//! Binding controllers from the module graph onto a router.

use crate::logging::debug;
use crate::routing::join_paths;
use crate::{
    ApplicationConfig, Error, ExceptionContext, ExceptionFilter, ExecutionContext, Guard,
    GuardContext, HandlerFn, HandlerFuture, HttpRequest, HttpResponse, Interceptor,
    ModuleContainer, PipeTransform, Route, Router,
};
use std::sync::Arc;

/// Populates a router with the routes of the module graph
pub trait RoutesResolver: Send + Sync {
    fn resolve(&self, router: &mut Router) -> Result<(), Error>;
}

/// Default resolver.
///
/// Every instance registered under a module's `routes` must be a
/// controller. Its routes are mounted at `base_path + route.path` and run
/// behind the global guards, pipes, interceptors and filters configured when
/// `resolve` is called; enhancers added later don't reach these routes.
pub struct ModuleRoutesResolver {
    container: Arc<ModuleContainer>,
    config: Arc<ApplicationConfig>,
}

impl ModuleRoutesResolver {
    pub fn new(container: Arc<ModuleContainer>, config: Arc<ApplicationConfig>) -> Self {
        Self { container, config }
    }
}

impl RoutesResolver for ModuleRoutesResolver {
    fn resolve(&self, router: &mut Router) -> Result<(), Error> {
        let pipeline = RequestPipeline::from_config(&self.config);

        for module in self.container.modules() {
            for wrapper in &module.routes {
                let Some(instance) = &wrapper.instance else {
                    continue;
                };
                let controller = instance.as_controller().ok_or_else(|| {
                    Error::Internal(format!(
                        "{} is registered as a controller of {} but is not one",
                        wrapper.token, module.name
                    ))
                })?;

                for route in controller.routes() {
                    let path = join_paths(controller.base_path(), &route.path);
                    debug!(
                        controller = %wrapper.token,
                        method = route.method.as_str(),
                        path = %path,
                        "Mapped route"
                    );
                    router.add_route(Route {
                        method: route.method,
                        path,
                        handler: pipeline.wrap(route.handler),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Global enhancers applied around each route handler
#[derive(Clone, Default)]
pub struct RequestPipeline {
    guards: Vec<Arc<dyn Guard>>,
    pipes: Vec<Arc<dyn PipeTransform>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    filters: Vec<Arc<dyn ExceptionFilter>>,
}

impl RequestPipeline {
    pub fn from_config(config: &ApplicationConfig) -> Self {
        Self {
            guards: config.global_guards(),
            pipes: config.global_pipes(),
            interceptors: config.global_interceptors(),
            filters: config.global_filters(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
            && self.pipes.is_empty()
            && self.interceptors.is_empty()
            && self.filters.is_empty()
    }

    /// Wrap a handler; an empty pipeline returns it unchanged
    pub fn wrap(&self, handler: HandlerFn) -> HandlerFn {
        if self.is_empty() {
            return handler;
        }
        let pipeline = Arc::new(self.clone());
        Arc::new(move |req: HttpRequest| -> HandlerFuture {
            let pipeline = pipeline.clone();
            let handler = handler.clone();
            Box::pin(async move { pipeline.run(req, handler).await })
        })
    }

    async fn run(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        let ctx = ExceptionContext::from_request(&req);
        let error = match self.execute(req, handler).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        for filter in &self.filters {
            if let Some(response) = filter.catch(&error, &ctx).await {
                debug!(filter = filter.name(), error = %error, "Exception caught by filter");
                return Ok(response);
            }
        }
        Err(error)
    }

    async fn execute(
        &self,
        mut req: HttpRequest,
        handler: HandlerFn,
    ) -> Result<HttpResponse, Error> {
        for guard in &self.guards {
            if !guard.can_activate(&GuardContext::new(&req)).await? {
                return Err(Error::Forbidden("Forbidden resource".to_string()));
            }
        }

        for pipe in &self.pipes {
            req = pipe.transform(req).await?;
        }

        let context = ExecutionContext {
            method: req.method.clone(),
            path: req.path.clone(),
        };

        // First registered interceptor ends up outermost
        let mut next = handler(req);
        for interceptor in self.interceptors.iter().rev() {
            let interceptor = interceptor.clone();
            let context = context.clone();
            let inner = next;
            next = Box::pin(async move { interceptor.intercept(context, inner).await });
        }
        next.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, Controller, FnExceptionFilter, FnGuard, HttpMethod, Module};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct UsersController;

    impl Controller for UsersController {
        fn base_path(&self) -> &str {
            "/users/"
        }

        fn routes(&self) -> Vec<Route> {
            vec![
                Route::new(HttpMethod::GET, "/", |_req| async { Ok(HttpResponse::ok()) }),
                Route::new(HttpMethod::GET, ":id", |req| async move {
                    let id = req.param("id").cloned().unwrap_or_default();
                    Ok(HttpResponse::ok().with_body(id.into_bytes()))
                }),
            ]
        }
    }

    impl Component for UsersController {
        fn as_controller(&self) -> Option<&dyn Controller> {
            Some(self)
        }
    }

    struct NotAController;
    impl Component for NotAController {}

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Interceptor for Tag {
        async fn intercept(
            &self,
            _context: ExecutionContext,
            next: HandlerFuture,
        ) -> Result<HttpResponse, Error> {
            self.log.lock().push(self.name);
            next.await
        }
    }

    fn resolver(config: Arc<ApplicationConfig>) -> ModuleRoutesResolver {
        let container = ModuleContainer::new().with_module(
            Module::new("UsersModule").controller("UsersController", Arc::new(UsersController)),
        );
        ModuleRoutesResolver::new(Arc::new(container), config)
    }

    #[tokio::test]
    async fn test_routes_joined_with_base_path() {
        let mut router = Router::new();
        resolver(Arc::new(ApplicationConfig::new()))
            .resolve(&mut router)
            .unwrap();

        let paths: Vec<&str> = router.routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/users", "/users/:id"]);

        let res = router
            .route(HttpRequest::new("GET".into(), "/users/42".into()))
            .await
            .unwrap();
        assert_eq!(res.body, b"42".to_vec());
    }

    #[test]
    fn test_non_controller_in_routes_fails() {
        let container = ModuleContainer::new()
            .with_module(Module::new("M").controller("Bogus", Arc::new(NotAController)));
        let resolver =
            ModuleRoutesResolver::new(Arc::new(container), Arc::new(ApplicationConfig::new()));
        assert!(matches!(
            resolver.resolve(&mut Router::new()),
            Err(Error::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_guard_rejection_and_filter() {
        let config = Arc::new(ApplicationConfig::new());
        config.add_global_guards(vec![Arc::new(FnGuard::new(|ctx| {
            Ok(ctx.get_header("x-role") == Some("admin"))
        }))]);

        let mut router = Router::new();
        resolver(config.clone()).resolve(&mut router).unwrap();
        let denied = router
            .route(HttpRequest::new("GET".into(), "/users".into()))
            .await;
        assert!(matches!(denied, Err(Error::Forbidden(m)) if m == "Forbidden resource"));

        config.add_global_filters(vec![Arc::new(FnExceptionFilter::new(|error, _ctx| {
            Some(HttpResponse::new(error.status_code()).with_body(b"handled".to_vec()))
        }))]);
        let mut router = Router::new();
        resolver(config).resolve(&mut router).unwrap();
        let res = router
            .route(HttpRequest::new("GET".into(), "/users".into()))
            .await
            .unwrap();
        assert_eq!(res.status, 403);
        assert_eq!(res.body, b"handled".to_vec());
    }

    #[tokio::test]
    async fn test_first_interceptor_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = Arc::new(ApplicationConfig::new());
        config.add_global_interceptors(vec![
            Arc::new(Tag { name: "outer", log: log.clone() }),
            Arc::new(Tag { name: "inner", log: log.clone() }),
        ]);

        let mut router = Router::new();
        resolver(config).resolve(&mut router).unwrap();
        router
            .route(HttpRequest::new("GET".into(), "/users".into()))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }
}
