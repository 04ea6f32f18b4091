//! Exception filters.
//!
//! When a route fails, the global filters are consulted in registration
//! order and the first filter that returns `Some(HttpResponse)` produces the
//! response. If none does, the error propagates to the HTTP server, which
//! renders it from [`Error::status_code`].

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;

/// Request details available to exception filters
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    pub method: String,
    pub path: String,
    /// Value of the `x-request-id` header, if any
    pub request_id: Option<String>,
}

impl ExceptionContext {
    pub fn from_request(request: &HttpRequest) -> Self {
        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            request_id: request.header("x-request-id").map(str::to_string),
        }
    }
}

/// Catches errors raised while handling a route
#[async_trait]
pub trait ExceptionFilter: Send + Sync + 'static {
    /// Return `Some` to handle the error, `None` to pass it on
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Renders every error as `{"statusCode", "message", "path"}` JSON
pub struct JsonExceptionFilter;

#[async_trait]
impl ExceptionFilter for JsonExceptionFilter {
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse> {
        let status = error.status_code();
        let mut body = serde_json::json!({
            "statusCode": status,
            "message": error.to_string(),
            "path": ctx.path,
        });
        if let Some(request_id) = &ctx.request_id {
            body["requestId"] = serde_json::Value::String(request_id.clone());
        }
        HttpResponse::new(status).with_json(&body).ok()
    }
}

/// Filter built from a function
pub struct FnExceptionFilter<F>
where
    F: Fn(&Error, &ExceptionContext) -> Option<HttpResponse> + Send + Sync + 'static,
{
    handler: F,
    name: String,
}

impl<F> FnExceptionFilter<F>
where
    F: Fn(&Error, &ExceptionContext) -> Option<HttpResponse> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            name: "FnExceptionFilter".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F> ExceptionFilter for FnExceptionFilter<F>
where
    F: Fn(&Error, &ExceptionContext) -> Option<HttpResponse> + Send + Sync + 'static,
{
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse> {
        (self.handler)(error, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
