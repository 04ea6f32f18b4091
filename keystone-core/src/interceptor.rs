// Interceptors wrapping handler execution

use crate::logging::{info, warn};
use crate::{Error, HandlerFuture, HttpResponse};
use async_trait::async_trait;

/// Execution context passed to interceptors
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub method: String,
    pub path: String,
}

/// Interceptor around the handler.
///
/// `next` runs the rest of the chain; an interceptor may short-circuit by
/// not awaiting it.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        context: ExecutionContext,
        next: HandlerFuture,
    ) -> Result<HttpResponse, Error>;
}

/// Logs each request with its status and duration
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        context: ExecutionContext,
        next: HandlerFuture,
    ) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let result = next.await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => info!(
                method = %context.method,
                path = %context.path,
                status = response.status,
                elapsed_ms,
                "Request handled"
            ),
            Err(e) => warn!(
                method = %context.method,
                path = %context.path,
                error = %e,
                elapsed_ms,
                "Request failed"
            ),
        }
        result
    }
}

/// Applies a function to every successful response
pub struct TransformInterceptor<F>
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    transform: F,
}

impl<F> TransformInterceptor<F>
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl<F> Interceptor for TransformInterceptor<F>
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    async fn intercept(
        &self,
        _context: ExecutionContext,
        next: HandlerFuture,
    ) -> Result<HttpResponse, Error> {
        let response = next.await?;
        Ok((self.transform)(response))
    }
}
