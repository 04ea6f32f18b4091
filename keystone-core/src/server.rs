// HTTP server driving an HttpAdapter over hyper

use crate::logging::{debug, error, info, warn};
use crate::{BoxError, DEFAULT_BODY_LIMIT, Error, HttpAdapter, HttpRequest, HttpResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::{body::Incoming as IncomingBody, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a listening server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandle {
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// The bound address; resolves port 0 to the real port
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

struct RunningServer {
    handle: ServerHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// HTTP/1 server for an [`HttpAdapter`]
///
/// Request bodies are read up to `body_limit` bytes; a longer body is
/// answered with 413 without buffering the rest.
pub struct HttpServer {
    adapter: Arc<HttpAdapter>,
    body_limit: usize,
    running: Mutex<Option<RunningServer>>,
    // Serializes binds so overlapping `listen` calls share one listener
    listen_lock: tokio::sync::Mutex<()>,
}

impl HttpServer {
    pub fn new(adapter: Arc<HttpAdapter>) -> Self {
        Self {
            adapter,
            body_limit: DEFAULT_BODY_LIMIT,
            running: Mutex::new(None),
            listen_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Maximum request body size read from a connection, in bytes
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn adapter(&self) -> &Arc<HttpAdapter> {
        &self.adapter
    }

    pub fn is_listening(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Handle of the running server, if any
    pub fn handle(&self) -> Option<ServerHandle> {
        self.running.lock().as_ref().map(|running| running.handle.clone())
    }

    /// Bind and start accepting connections.
    ///
    /// Returns the existing handle when already listening.
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> Result<ServerHandle, Error> {
        let _bind = self.listen_lock.lock().await;
        if let Some(handle) = self.handle() {
            return Ok(handle);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            self.adapter.clone(),
            self.body_limit,
            shutdown_rx,
        ));

        let handle = ServerHandle { local_addr };
        *self.running.lock() = Some(RunningServer {
            handle: handle.clone(),
            shutdown,
            task,
        });

        info!(address = %local_addr, "Server listening on http://{}", local_addr);
        Ok(handle)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Open connections finish their in-flight request. Closing a server
    /// that isn't listening is a no-op.
    pub async fn close(&self) -> Result<(), Error> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        running
            .task
            .await
            .map_err(|e| Error::Internal(format!("Server task failed: {}", e)))?;
        info!(address = %running.handle.local_addr, "Server closed");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    adapter: Arc<HttpAdapter>,
    body_limit: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    adapter.clone(),
                    body_limit,
                    shutdown.clone(),
                ));
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    adapter: Arc<HttpAdapter>,
    body_limit: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let service = AdapterService {
        adapter,
        body_limit,
    };

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(err) = result {
        debug!(peer = %peer, error = %err, "Error serving connection");
    }
}

// Named service (instead of a `service_fn` closure) so the connection
// future's type carries no inferred trait-object lifetimes; this keeps the
// spawned task provably `Send`.
struct AdapterService {
    adapter: Arc<HttpAdapter>,
    body_limit: usize,
}

impl hyper::service::Service<Request<IncomingBody>> for AdapterService {
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn call(&self, req: Request<IncomingBody>) -> Self::Future {
        let adapter = self.adapter.clone();
        let body_limit = self.body_limit;
        Box::pin(async move { handle_request(req, adapter, body_limit).await })
    }
}

async fn handle_request(
    req: Request<IncomingBody>,
    adapter: Arc<HttpAdapter>,
    body_limit: usize,
) -> Result<Response<Full<Bytes>>, BoxError> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, path);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    request.body = match Limited::new(req.into_body(), body_limit).collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(err) if err.is::<LengthLimitError>() => {
            let err = Error::PayloadTooLarge(format!(
                "Request body exceeds maximum size of {} bytes",
                body_limit
            ));
            return Ok(into_hyper(error_response(&err)));
        }
        Err(err) => return Err(err),
    };

    let response = match adapter.handle(request).await {
        Ok(response) => response,
        Err(err) => error_response(&err),
    };
    Ok(into_hyper(response))
}

fn error_response(err: &Error) -> HttpResponse {
    let status = err.status_code();
    if err.is_server_error() {
        error!(error = %err, status, "Request failed");
    } else {
        debug!(error = %err, status, "Request rejected");
    }
    let body = serde_json::json!({
        "error": err.to_string(),
        "status": status,
    });
    HttpResponse::new(status)
        .with_json(&body)
        .unwrap_or_else(|_| HttpResponse::internal_server_error())
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            error!(error = %e, "Invalid response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
