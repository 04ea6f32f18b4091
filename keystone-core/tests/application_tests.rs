//! Integration tests for the application bootstrap sequence.

use async_trait::async_trait;
use keystone_core::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

// =============================================================================
// Test doubles
// =============================================================================

struct RecordingSocketModule {
    log: Log,
}

#[async_trait]
impl SocketModule for RecordingSocketModule {
    async fn setup(
        &self,
        _container: Arc<ModuleContainer>,
        _config: Arc<ApplicationConfig>,
    ) -> Result<(), Error> {
        self.log.lock().push("socket:setup".into());
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.log.lock().push("socket:close".into());
        Ok(())
    }
}

struct RecordingMicroservicesModule {
    log: Log,
}

#[async_trait]
impl MicroservicesModule for RecordingMicroservicesModule {
    async fn setup(
        &self,
        _container: Arc<ModuleContainer>,
        _config: Arc<ApplicationConfig>,
    ) -> Result<(), Error> {
        self.log.lock().push("microservices:setup".into());
        Ok(())
    }

    async fn setup_clients(&self, _container: Arc<ModuleContainer>) -> Result<(), Error> {
        self.log.lock().push("microservices:clients".into());
        Ok(())
    }
}

struct RecordingMiddlewareSetup {
    log: Log,
}

#[async_trait]
impl MiddlewareSetup for RecordingMiddlewareSetup {
    async fn setup(
        &self,
        _middleware: &MiddlewareContainer,
        _container: &ModuleContainer,
        _config: &ApplicationConfig,
    ) -> Result<(), Error> {
        self.log.lock().push("middleware:setup".into());
        Ok(())
    }

    async fn setup_middlewares(
        &self,
        _middleware: &MiddlewareContainer,
        _router: &mut Router,
    ) -> Result<(), Error> {
        self.log.lock().push("middleware:apply".into());
        Ok(())
    }
}

struct CountingResolver {
    log: Log,
    calls: AtomicUsize,
}

impl RoutesResolver for CountingResolver {
    fn resolve(&self, _router: &mut Router) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("routes:resolve".into());
        Ok(())
    }
}

struct HookedService {
    name: &'static str,
    log: Log,
}

#[async_trait]
impl OnModuleInit for HookedService {
    async fn on_module_init(&self) -> LifecycleResult {
        self.log.lock().push(format!("init:{}", self.name));
        Ok(())
    }
}

#[async_trait]
impl OnModuleDestroy for HookedService {
    async fn on_module_destroy(&self) -> LifecycleResult {
        self.log.lock().push(format!("destroy:{}", self.name));
        Ok(())
    }
}

impl Component for HookedService {
    fn as_init_hook(&self) -> Option<&dyn OnModuleInit> {
        Some(self)
    }

    fn as_destroy_hook(&self) -> Option<&dyn OnModuleDestroy> {
        Some(self)
    }
}

struct CatsController;

impl Controller for CatsController {
    fn base_path(&self) -> &str {
        "cats"
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::new(HttpMethod::GET, "/", |_req| async {
                Ok(HttpResponse::ok().with_body(b"all cats".to_vec()))
            }),
            Route::new(HttpMethod::GET, "/:name", |req| async move {
                let name = req.param("name").cloned().unwrap_or_default();
                Ok(HttpResponse::ok().with_body(name.into_bytes()))
            }),
        ]
    }
}

impl Component for CatsController {
    fn as_controller(&self) -> Option<&dyn Controller> {
        Some(self)
    }
}

/// Transport server configured through its options:
/// `name`, `delay_ms` before it reports listening, and `fail`
struct FakeMicroservice {
    name: String,
    delay: Duration,
    fail: bool,
    log: Log,
    initialized: AtomicBool,
    init_hook_called: AtomicBool,
    terminated: AtomicBool,
}

#[async_trait]
impl Microservice for FakeMicroservice {
    fn setup_listeners(&self) -> Result<(), Error> {
        self.log.lock().push(format!("listeners:{}", self.name));
        Ok(())
    }

    async fn listen(&self) -> Result<(), Error> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::Microservice(format!("{} failed to bind", self.name)));
        }
        self.log.lock().push(format!("listen:{}", self.name));
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        let terminated = self.terminated.load(Ordering::SeqCst);
        self.log
            .lock()
            .push(format!("close:{}:terminated={}", self.name, terminated));
        Ok(())
    }

    fn set_is_initialized(&self, value: bool) {
        self.initialized.store(value, Ordering::SeqCst);
    }

    fn set_is_init_hook_called(&self, value: bool) {
        self.init_hook_called.store(value, Ordering::SeqCst);
    }

    fn set_is_terminated(&self, value: bool) {
        self.terminated.store(value, Ordering::SeqCst);
    }
}

struct FakeFactory {
    log: Log,
    created: Arc<Mutex<Vec<Arc<FakeMicroservice>>>>,
}

impl MicroserviceFactory for FakeFactory {
    fn create(
        &self,
        _container: Arc<ModuleContainer>,
        options: MicroserviceOptions,
    ) -> Result<Arc<dyn Microservice>, Error> {
        let name = options.options["name"].as_str().unwrap_or("anonymous").to_string();
        let delay = options.options["delay_ms"].as_u64().unwrap_or(0);
        let fail = options.options["fail"].as_bool().unwrap_or(false);

        let instance = Arc::new(FakeMicroservice {
            name,
            delay: Duration::from_millis(delay),
            fail,
            log: self.log.clone(),
            initialized: AtomicBool::new(false),
            init_hook_called: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        });
        self.created.lock().push(instance.clone());
        Ok(instance)
    }
}

fn service_options(name: &str, delay_ms: u64) -> MicroserviceOptions {
    MicroserviceOptions::new(Transport::Tcp)
        .option("name", name)
        .option("delay_ms", delay_ms)
}

fn microservice_app(log: &Log) -> (Application, Arc<Mutex<Vec<Arc<FakeMicroservice>>>>) {
    let created = Arc::new(Mutex::new(Vec::new()));
    let factory: Arc<dyn MicroserviceFactory> = Arc::new(FakeFactory {
        log: log.clone(),
        created: created.clone(),
    });
    let capabilities = CapabilityResolver::new().provide(MICROSERVICE_SERVER, factory);
    let app =
        Application::with_capabilities(ModuleContainer::new(), HttpAdapter::new(), &capabilities);
    (app, created)
}

fn cats_app() -> Application {
    let container = ModuleContainer::new().with_module(
        Module::new("CatsModule").controller("CatsController", Arc::new(CatsController)),
    );
    Application::with_capabilities(container, HttpAdapter::new(), &CapabilityResolver::new())
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test]
async fn test_init_runs_phases_in_order() {
    let log = new_log();
    let socket: Arc<dyn SocketModule> = Arc::new(RecordingSocketModule { log: log.clone() });
    let microservices: Arc<dyn MicroservicesModule> =
        Arc::new(RecordingMicroservicesModule { log: log.clone() });
    let capabilities = CapabilityResolver::new()
        .provide(SOCKET_MODULE, socket)
        .provide(MICROSERVICES_MODULE, microservices);

    let container = ModuleContainer::new().with_module(Module::new("AppModule").provider(
        "AppService",
        Arc::new(HookedService {
            name: "AppService",
            log: log.clone(),
        }),
    ));

    let app = Application::with_capabilities(container, HttpAdapter::new(), &capabilities)
        .with_middleware_setup(Arc::new(RecordingMiddlewareSetup { log: log.clone() }))
        .with_routes_resolver(Arc::new(CountingResolver {
            log: log.clone(),
            calls: AtomicUsize::new(0),
        }));

    assert_ok!(app.init().await);

    assert_eq!(
        entries(&log),
        vec![
            "socket:setup",
            "microservices:setup",
            "microservices:clients",
            "middleware:setup",
            "middleware:apply",
            "routes:resolve",
            "init:AppService",
        ]
    );
    assert!(app.is_initialized());
    assert_eq!(app.state(), ApplicationState::Ready);
}

#[tokio::test]
async fn test_absent_subsystems_are_skipped() {
    let app = cats_app();
    app.init().await.unwrap();
    assert!(app.config().io_adapter().is_none());
    assert_eq!(app.http_adapter().route_paths(), vec!["/cats", "/cats/:name"]);
}

#[tokio::test]
async fn test_failed_init_is_not_retriable() {
    struct Broken;

    #[async_trait]
    impl OnModuleInit for Broken {
        async fn on_module_init(&self) -> LifecycleResult {
            Err("database unreachable".into())
        }
    }

    impl Component for Broken {
        fn as_init_hook(&self) -> Option<&dyn OnModuleInit> {
            Some(self)
        }
    }

    let container = ModuleContainer::new()
        .with_module(Module::new("DbModule").provider("Database", Arc::new(Broken)));
    let app =
        Application::with_capabilities(container, HttpAdapter::new(), &CapabilityResolver::new());

    let err = assert_err!(app.init().await);
    assert!(matches!(err, Error::Lifecycle { ref component, .. } if component == "Database"));
    assert!(!app.is_initialized());
    assert_eq!(app.state(), ApplicationState::Failed);
    assert!(matches!(app.init().await, Err(Error::InvalidState(_))));
}

// =============================================================================
// Listening
// =============================================================================

#[tokio::test]
async fn test_listen_twice_initializes_once() {
    let log = new_log();
    let resolver = Arc::new(CountingResolver {
        log: log.clone(),
        calls: AtomicUsize::new(0),
    });
    let app = Application::with_capabilities(
        ModuleContainer::new(),
        HttpAdapter::new(),
        &CapabilityResolver::new(),
    )
    .with_routes_resolver(resolver.clone());

    let first = assert_ok!(app.listen_async(0, Some("127.0.0.1")).await);
    let second = assert_ok!(app.listen_async(0, Some("127.0.0.1")).await);

    assert_eq!(first, second);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert!(app.http_server().is_listening());

    app.close().await.unwrap();
    assert!(!app.http_server().is_listening());
}

#[tokio::test]
async fn test_overlapping_listen_shares_one_init() {
    struct SlowMiddlewareSetup;

    #[async_trait]
    impl MiddlewareSetup for SlowMiddlewareSetup {
        async fn setup(
            &self,
            _middleware: &MiddlewareContainer,
            _container: &ModuleContainer,
            _config: &ApplicationConfig,
        ) -> Result<(), Error> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }

        async fn setup_middlewares(
            &self,
            _middleware: &MiddlewareContainer,
            _router: &mut Router,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    let resolver = Arc::new(CountingResolver {
        log: new_log(),
        calls: AtomicUsize::new(0),
    });
    let app = Application::with_capabilities(
        ModuleContainer::new(),
        HttpAdapter::new(),
        &CapabilityResolver::new(),
    )
    .with_middleware_setup(Arc::new(SlowMiddlewareSetup))
    .with_routes_resolver(resolver.clone());

    let (first, second) = tokio::join!(
        app.listen_async(0, Some("127.0.0.1")),
        app.listen_async(0, Some("127.0.0.1")),
    );
    let first = assert_ok!(first);
    let second = assert_ok!(second);

    assert_eq!(first, second);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.state(), ApplicationState::Ready);

    app.close().await.unwrap();
}

// =============================================================================
// Global prefix
// =============================================================================

#[tokio::test]
async fn test_global_prefix_is_normalized() {
    let cases = [
        ("", vec!["/cats", "/cats/:name"]),
        ("api", vec!["/api/cats", "/api/cats/:name"]),
        ("/api/", vec!["/api/cats", "/api/cats/:name"]),
        ("api/v1", vec!["/api/v1/cats", "/api/v1/cats/:name"]),
    ];

    for (prefix, expected) in cases {
        let app = cats_app();
        app.set_global_prefix(prefix);
        app.init().await.unwrap();
        assert_eq!(app.http_adapter().route_paths(), expected, "prefix {:?}", prefix);

        let path = format!("{}/tom", expected[0]);
        let response = app
            .http_adapter()
            .handle(HttpRequest::new("GET".into(), path))
            .await
            .unwrap();
        assert_eq!(response.body, b"tom".to_vec());
    }
}

#[tokio::test]
async fn test_prefix_set_after_init_has_no_effect() {
    let app = cats_app();
    app.init().await.unwrap();
    app.set_global_prefix("late");
    assert_eq!(app.http_adapter().route_paths(), vec!["/cats", "/cats/:name"]);
}

// =============================================================================
// Global enhancers
// =============================================================================

#[tokio::test]
async fn test_global_enhancers_accumulate_in_order() {
    let app = cats_app();
    let first: Arc<dyn Guard> = Arc::new(HeaderGuard::present("x-api-key"));
    let second: Arc<dyn Guard> = Arc::new(HeaderGuard::equals("x-tenant", "acme"));

    app.use_global_guards(vec![first.clone()])
        .use_global_guards(vec![second.clone()])
        .use_global_pipes(vec![Arc::new(RequireParsedBodyPipe)])
        .use_global_interceptors(vec![Arc::new(LoggingInterceptor)])
        .use_global_filters(vec![Arc::new(JsonExceptionFilter)]);

    let guards = app.config().global_guards();
    assert_eq!(guards.len(), 2);
    assert!(Arc::ptr_eq(&guards[0], &first));
    assert!(Arc::ptr_eq(&guards[1], &second));
    assert_eq!(app.config().global_pipes().len(), 1);
    assert_eq!(app.config().global_interceptors().len(), 1);
    assert_eq!(app.config().global_filters().len(), 1);
}

#[tokio::test]
async fn test_global_guard_protects_routes() {
    let app = cats_app();
    app.use_global_guards(vec![Arc::new(HeaderGuard::present("x-api-key"))]);
    app.init().await.unwrap();

    let denied = app
        .http_adapter()
        .handle(HttpRequest::new("GET".into(), "/cats".into()))
        .await;
    assert!(matches!(denied, Err(Error::Forbidden(_))));

    let allowed = app
        .http_adapter()
        .handle(HttpRequest::new("GET".into(), "/cats".into()).with_header("X-Api-Key", "k"))
        .await
        .unwrap();
    assert_eq!(allowed.body, b"all cats".to_vec());
}

// =============================================================================
// Microservices
// =============================================================================

#[tokio::test]
async fn test_connect_without_transport_fails() {
    let app = cats_app();
    let result = app.connect_microservice(service_options("orders", 0));
    assert!(matches!(result, Err(Error::CapabilityNotFound(_))));
    assert!(app.get_microservices().is_empty());
}

#[tokio::test]
async fn test_connect_prepares_instance() {
    let log = new_log();
    let (app, created) = microservice_app(&log);

    app.connect_microservice(service_options("orders", 0)).unwrap();

    let created = created.lock();
    assert_eq!(created.len(), 1);
    assert!(created[0].initialized.load(Ordering::SeqCst));
    assert!(created[0].init_hook_called.load(Ordering::SeqCst));
    assert!(!created[0].terminated.load(Ordering::SeqCst));
    assert_eq!(app.get_microservices().len(), 1);
    assert_eq!(entries(&log), vec!["listeners:orders"]);
}

#[tokio::test]
async fn test_start_all_waits_for_every_microservice() {
    let log = new_log();
    let (app, _created) = microservice_app(&log);
    for (name, delay) in [("a", 30), ("b", 10), ("c", 20)] {
        app.connect_microservice(service_options(name, delay)).unwrap();
    }
    log.lock().clear();

    let callback_log = log.clone();
    app.start_all_microservices(move || callback_log.lock().push("callback".into()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        entries(&log),
        vec!["listen:b", "listen:c", "listen:a", "callback"]
    );
}

#[tokio::test]
async fn test_start_all_reports_every_failure() {
    let log = new_log();
    let (app, _created) = microservice_app(&log);
    app.connect_microservice(service_options("ok", 5)).unwrap();
    app.connect_microservice(service_options("bad1", 0).option("fail", true))
        .unwrap();
    app.connect_microservice(service_options("bad2", 10).option("fail", true))
        .unwrap();

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let result = app
        .start_all_microservices(move || flag.store(true, Ordering::SeqCst))
        .await
        .unwrap();

    match result {
        Err(Error::MicroservicesFailed(failures)) => assert_eq!(failures.len(), 2),
        other => panic!("expected aggregated failures, got {:?}", other),
    }
    assert!(!called.load(Ordering::SeqCst));
    assert!(entries(&log).contains(&"listen:ok".to_string()));
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_close_runs_teardown_in_order() {
    let log = new_log();
    let socket: Arc<dyn SocketModule> = Arc::new(RecordingSocketModule { log: log.clone() });
    let created = Arc::new(Mutex::new(Vec::new()));
    let factory: Arc<dyn MicroserviceFactory> = Arc::new(FakeFactory {
        log: log.clone(),
        created,
    });
    let capabilities = CapabilityResolver::new()
        .provide(SOCKET_MODULE, socket)
        .provide(MICROSERVICE_SERVER, factory);

    let container = ModuleContainer::new().with_module(Module::new("AppModule").provider(
        "AppService",
        Arc::new(HookedService {
            name: "AppService",
            log: log.clone(),
        }),
    ));
    let app = Application::with_capabilities(container, HttpAdapter::new(), &capabilities);

    app.connect_microservice(service_options("first", 0)).unwrap();
    app.connect_microservice(service_options("second", 0)).unwrap();
    app.listen_async(0, Some("127.0.0.1")).await.unwrap();
    log.lock().clear();

    app.close().await.unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "socket:close",
            "close:first:terminated=true",
            "close:second:terminated=true",
            "destroy:AppService",
        ]
    );
    assert_eq!(app.state(), ApplicationState::Closed);
    assert!(!app.http_server().is_listening());
}
