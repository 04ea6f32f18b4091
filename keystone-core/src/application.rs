//! Application bootstrap.
//!
//! [`Application`] takes a built module graph and an [`HttpAdapter`] and
//! brings them to a servable state:
//!
//! 1. construction installs the body parsers, resolves optional subsystems
//!    and creates the shared [`ApplicationConfig`];
//! 2. [`Application::init`] sets up the WebSocket and microservice modules,
//!    module middleware, then routes under the global prefix, then calls
//!    every `OnModuleInit` hook;
//! 3. [`Application::listen`] runs `init` once and starts the HTTP server;
//! 4. [`Application::close`] tears everything down and calls every
//!    `OnModuleDestroy` hook.
//!
//! ```no_run
//! use keystone_core::{Application, HttpAdapter, ModuleContainer};
//!
//! # async fn run() -> Result<(), keystone_core::Error> {
//! let app = Application::new(ModuleContainer::new(), HttpAdapter::new());
//! app.set_global_prefix("api");
//! let handle = app.listen(3000).await?;
//! println!("listening on {}", handle.local_addr());
//! app.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::capability::{
    Capability, CapabilityResolver, IO_ADAPTER, MICROSERVICES_MODULE, MICROSERVICE_SERVER,
    SOCKET_MODULE,
};
use crate::lifecycle::{call_destroy_hook, call_init_hook};
use crate::logging::{debug, info};
use crate::routing::validate_path;
use crate::{
    install_body_parsers, ApplicationConfig, ApplicationOptions, Error, ExceptionFilter, Guard,
    HttpAdapter, HttpServer, Interceptor, IoAdapterFactory, Microservice, MicroserviceFactory,
    MicroserviceOptions, MicroserviceRegistry, MicroservicesModule, Middleware,
    MiddlewareContainer, MiddlewareSetup, MiddlewaresModule, ModuleContainer,
    ModuleRoutesResolver, PipeTransform, RoutesResolver, ServerHandle, SocketModule,
    WebSocketAdapter,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Host used when `listen` is given no hostname
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Bootstrap state of an [`Application`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    /// Built, not yet initialized
    Constructed,
    /// `init` is running
    Initializing,
    Ready,
    /// `init` failed or was interrupted; the application can't be started
    Failed,
    Closed,
}

/// The application bootstrap runtime
pub struct Application {
    container: Arc<ModuleContainer>,
    http_adapter: Arc<HttpAdapter>,
    http_server: HttpServer,
    config: Arc<ApplicationConfig>,
    options: ApplicationOptions,
    routes_resolver: Arc<dyn RoutesResolver>,
    middleware_setup: Arc<dyn MiddlewareSetup>,
    middleware_container: MiddlewareContainer,
    socket_module: Capability<Arc<dyn SocketModule>>,
    microservices_module: Capability<Arc<dyn MicroservicesModule>>,
    microservices: Arc<MicroserviceRegistry>,
    state: Mutex<ApplicationState>,
    is_initialized: AtomicBool,
    // Held for the whole of `init` so concurrent callers wait for one run
    init_lock: tokio::sync::Mutex<()>,
}

impl Application {
    /// Build with default options and every registered capability
    pub fn new(container: ModuleContainer, adapter: HttpAdapter) -> Self {
        Self::with_capabilities(container, adapter, &CapabilityResolver::discover())
    }

    /// Build with an explicit set of optional subsystems
    pub fn with_capabilities(
        container: ModuleContainer,
        adapter: HttpAdapter,
        capabilities: &CapabilityResolver,
    ) -> Self {
        Self::from_options(container, adapter, capabilities, ApplicationOptions::default())
    }

    /// Build from loaded [`ApplicationOptions`]
    pub fn from_options(
        container: ModuleContainer,
        adapter: HttpAdapter,
        capabilities: &CapabilityResolver,
        options: ApplicationOptions,
    ) -> Self {
        let container = Arc::new(container);
        let http_adapter = Arc::new(adapter);

        // Parsers go first so every later middleware and route sees a parsed body
        install_body_parsers(&http_adapter, options.body_limit);

        let http_server = HttpServer::new(http_adapter.clone()).with_body_limit(options.body_limit);
        let config = Arc::new(ApplicationConfig::new());

        if let Capability::Present(factory) =
            capabilities.resolve::<Arc<dyn IoAdapterFactory>>(IO_ADAPTER)
        {
            let io_adapter = factory.create(&http_server);
            debug!(adapter = io_adapter.name(), "Default WebSocket adapter created");
            config.set_io_adapter(io_adapter);
        }
        if !options.global_prefix.is_empty() {
            config.set_global_prefix(options.global_prefix.clone());
        }

        let routes_resolver =
            Arc::new(ModuleRoutesResolver::new(container.clone(), config.clone()));
        let microservices = Arc::new(MicroserviceRegistry::new(
            capabilities.resolve::<Arc<dyn MicroserviceFactory>>(MICROSERVICE_SERVER),
        ));

        info!(
            modules = container.len(),
            body_limit = options.body_limit,
            "Keystone application created"
        );

        Self {
            container,
            http_adapter,
            http_server,
            config,
            options,
            routes_resolver,
            middleware_setup: Arc::new(MiddlewaresModule),
            middleware_container: MiddlewareContainer::new(),
            socket_module: capabilities.resolve(SOCKET_MODULE),
            microservices_module: capabilities.resolve(MICROSERVICES_MODULE),
            microservices,
            state: Mutex::new(ApplicationState::Constructed),
            is_initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the routes resolver
    pub fn with_routes_resolver(mut self, resolver: Arc<dyn RoutesResolver>) -> Self {
        self.routes_resolver = resolver;
        self
    }

    /// Replace the module middleware setup
    pub fn with_middleware_setup(mut self, setup: Arc<dyn MiddlewareSetup>) -> Self {
        self.middleware_setup = setup;
        self
    }

    /// Initialize the application once.
    ///
    /// Concurrent callers wait for the same run. A no-op when already
    /// initialized. A failed `init` is not retriable: later calls return
    /// [`Error::InvalidState`].
    pub async fn init(&self) -> Result<(), Error> {
        let _init = self.init_lock.lock().await;
        match self.state() {
            ApplicationState::Ready => return Ok(()),
            ApplicationState::Constructed => {}
            // A cancelled `init` leaves `Initializing` behind
            ApplicationState::Initializing | ApplicationState::Failed => {
                return Err(Error::InvalidState("initialization has failed".to_string()));
            }
            ApplicationState::Closed => {
                return Err(Error::InvalidState("application is closed".to_string()));
            }
        }
        self.set_state(ApplicationState::Initializing);

        if let Err(err) = self.run_init().await {
            self.set_state(ApplicationState::Failed);
            return Err(err);
        }

        self.is_initialized.store(true, Ordering::SeqCst);
        self.set_state(ApplicationState::Ready);
        info!("Keystone application successfully started");
        Ok(())
    }

    async fn run_init(&self) -> Result<(), Error> {
        self.register_modules().await?;
        self.register_router().await?;
        call_init_hook(&self.container).await
    }

    fn set_state(&self, state: ApplicationState) {
        *self.state.lock() = state;
    }

    async fn register_modules(&self) -> Result<(), Error> {
        if let Some(socket_module) = self.socket_module.as_ref() {
            debug!("Setting up WebSocket module");
            socket_module
                .setup(self.container.clone(), self.config.clone())
                .await?;
        }

        if let Some(microservices_module) = self.microservices_module.as_ref() {
            debug!("Setting up microservices module");
            microservices_module
                .setup(self.container.clone(), self.config.clone())
                .await?;
            microservices_module
                .setup_clients(self.container.clone())
                .await?;
        }

        debug!("Setting up module middleware");
        self.middleware_setup
            .setup(&self.middleware_container, &self.container, &self.config)
            .await
    }

    async fn register_router(&self) -> Result<(), Error> {
        let prefix = validate_path(&self.config.global_prefix());
        let mut router = HttpAdapter::create_router();

        self.middleware_setup
            .setup_middlewares(&self.middleware_container, &mut router)
            .await?;
        self.routes_resolver.resolve(&mut router)?;

        debug!(prefix = %prefix, routes = router.routes.len(), "Routes resolved");
        self.http_adapter.mount(&prefix, router);
        Ok(())
    }

    /// Start the HTTP server on `port`, initializing first if needed
    pub async fn listen(&self, port: u16) -> Result<ServerHandle, Error> {
        self.listen_async(port, None).await
    }

    /// Start the HTTP server on `hostname:port` (default host `0.0.0.0`).
    ///
    /// Resolves once the socket is bound. Calling it again returns the
    /// running server's handle.
    pub async fn listen_async(
        &self,
        port: u16,
        hostname: Option<&str>,
    ) -> Result<ServerHandle, Error> {
        if self.state() == ApplicationState::Closed {
            return Err(Error::InvalidState("application is closed".to_string()));
        }
        if !self.is_initialized() {
            self.init().await?;
        }

        let host = hostname.unwrap_or(DEFAULT_HOST);
        self.http_server.listen((host, port)).await
    }

    /// Listen on the host and port from the application options
    pub async fn listen_configured(&self) -> Result<ServerHandle, Error> {
        self.listen_async(self.options.port, Some(&self.options.host))
            .await
    }

    /// Shut down: WebSocket module, HTTP server, microservices, then
    /// destroy hooks. Stops at the first failure.
    pub async fn close(&self) -> Result<(), Error> {
        if let Some(socket_module) = self.socket_module.as_ref() {
            socket_module.close().await?;
        }
        self.http_server.close().await?;
        self.microservices.close_all().await?;
        call_destroy_hook(&self.container).await?;

        self.set_state(ApplicationState::Closed);
        info!("Keystone application closed");
        Ok(())
    }

    /// Register application-wide middleware; it runs after the body parsers
    pub fn use_middleware<M: Middleware + 'static>(&self, middleware: M) -> &Self {
        self.http_adapter.use_middleware(middleware);
        self
    }

    /// Set the prefix all routes are mounted under; takes effect at `init`
    pub fn set_global_prefix(&self, prefix: impl Into<String>) -> &Self {
        self.config.set_global_prefix(prefix);
        self
    }

    pub fn use_web_socket_adapter(&self, adapter: Arc<dyn WebSocketAdapter>) -> &Self {
        self.config.set_io_adapter(adapter);
        self
    }

    pub fn use_global_filters(&self, filters: Vec<Arc<dyn ExceptionFilter>>) -> &Self {
        self.config.add_global_filters(filters);
        self
    }

    pub fn use_global_pipes(&self, pipes: Vec<Arc<dyn PipeTransform>>) -> &Self {
        self.config.add_global_pipes(pipes);
        self
    }

    pub fn use_global_interceptors(&self, interceptors: Vec<Arc<dyn Interceptor>>) -> &Self {
        self.config.add_global_interceptors(interceptors);
        self
    }

    pub fn use_global_guards(&self, guards: Vec<Arc<dyn Guard>>) -> &Self {
        self.config.add_global_guards(guards);
        self
    }

    /// Attach a microservice sharing this application's module graph
    pub fn connect_microservice(
        &self,
        options: MicroserviceOptions,
    ) -> Result<Arc<dyn Microservice>, Error> {
        self.microservices.connect(self.container.clone(), options)
    }

    pub fn get_microservices(&self) -> Vec<Arc<dyn Microservice>> {
        self.microservices.microservices()
    }

    /// Start every attached microservice in the background.
    ///
    /// `callback` runs once all of them are listening; it is skipped if any
    /// failed. The join handle carries the outcome.
    pub fn start_all_microservices<F>(&self, callback: F) -> JoinHandle<Result<(), Error>>
    where
        F: FnOnce() + Send + 'static,
    {
        let microservices = self.microservices.clone();
        tokio::spawn(async move {
            microservices.start_all().await?;
            callback();
            Ok(())
        })
    }

    /// Start every attached microservice and wait until all are listening
    pub async fn start_all_microservices_async(&self) -> Result<(), Error> {
        self.microservices.start_all().await
    }

    pub fn state(&self) -> ApplicationState {
        *self.state.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Arc<ApplicationConfig> {
        &self.config
    }

    pub fn container(&self) -> &Arc<ModuleContainer> {
        &self.container
    }

    pub fn http_adapter(&self) -> &Arc<HttpAdapter> {
        &self.http_adapter
    }

    pub fn http_server(&self) -> &HttpServer {
        &self.http_server
    }

    pub fn options(&self) -> &ApplicationOptions {
        &self.options
    }
}
