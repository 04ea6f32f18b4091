// Guards for route protection

use crate::{Error, HttpRequest};
use async_trait::async_trait;

/// Execution context for guards
pub struct GuardContext<'a> {
    pub request: &'a HttpRequest,
}

impl<'a> GuardContext<'a> {
    pub fn new(request: &'a HttpRequest) -> Self {
        Self { request }
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn get_param(&self, name: &str) -> Option<&String> {
        self.request.path_params.get(name)
    }
}

/// Decides whether a request may reach its handler.
///
/// Returning `Ok(false)` rejects the request with `403 Forbidden resource`;
/// returning an error rejects it with that error.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn can_activate(&self, context: &GuardContext<'_>) -> Result<bool, Error>;
}

/// Guard built from a predicate
pub struct FnGuard<F>
where
    F: Fn(&GuardContext<'_>) -> Result<bool, Error> + Send + Sync,
{
    predicate: F,
}

impl<F> FnGuard<F>
where
    F: Fn(&GuardContext<'_>) -> Result<bool, Error> + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<F> Guard for FnGuard<F>
where
    F: Fn(&GuardContext<'_>) -> Result<bool, Error> + Send + Sync,
{
    async fn can_activate(&self, context: &GuardContext<'_>) -> Result<bool, Error> {
        (self.predicate)(context)
    }
}

/// Requires a header to be present, optionally with an exact value
pub struct HeaderGuard {
    name: String,
    expected: Option<String>,
}

impl HeaderGuard {
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: None,
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: Some(value.into()),
        }
    }
}

#[async_trait]
impl Guard for HeaderGuard {
    async fn can_activate(&self, context: &GuardContext<'_>) -> Result<bool, Error> {
        let Some(value) = context.get_header(&self.name) else {
            return Ok(false);
        };
        Ok(self
            .expected
            .as_deref()
            .map_or(true, |expected| expected == value))
    }
}
