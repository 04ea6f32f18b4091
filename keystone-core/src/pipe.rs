// Pipes transforming requests before they reach a handler

use crate::{Error, HttpRequest};
use async_trait::async_trait;

/// Transforms or validates a request; an error rejects it
#[async_trait]
pub trait PipeTransform: Send + Sync {
    async fn transform(&self, request: HttpRequest) -> Result<HttpRequest, Error>;
}

/// Pipe built from a function
pub struct FnPipe<F>
where
    F: Fn(HttpRequest) -> Result<HttpRequest, Error> + Send + Sync,
{
    transform: F,
}

impl<F> FnPipe<F>
where
    F: Fn(HttpRequest) -> Result<HttpRequest, Error> + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl<F> PipeTransform for FnPipe<F>
where
    F: Fn(HttpRequest) -> Result<HttpRequest, Error> + Send + Sync,
{
    async fn transform(&self, request: HttpRequest) -> Result<HttpRequest, Error> {
        (self.transform)(request)
    }
}

/// Rejects bodied requests whose body was not decoded by a body parser
pub struct RequireParsedBodyPipe;

#[async_trait]
impl PipeTransform for RequireParsedBodyPipe {
    async fn transform(&self, request: HttpRequest) -> Result<HttpRequest, Error> {
        if !request.body.is_empty() && request.parsed_body.is_none() {
            return Err(Error::UnsupportedMediaType(
                request
                    .header("content-type")
                    .unwrap_or("missing content type")
                    .to_string(),
            ));
        }
        Ok(request)
    }
}
