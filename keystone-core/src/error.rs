// Error types for the Keystone runtime

use thiserror::Error;

/// Boxed error returned by user-supplied lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    // Bootstrap errors
    #[error("Capability not found: `{0}` is not installed")]
    CapabilityNotFound(String),

    #[error("{hook} failed for {component}: {source}")]
    Lifecycle {
        component: String,
        hook: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Microservice error: {0}")]
    Microservice(String),

    #[error("{} microservice(s) failed to start", .0.len())]
    MicroservicesFailed(Vec<Error>),

    #[error("Invalid application state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => 404,
            Error::Deserialization(_) | Error::BadRequest(_) => 400,
            Error::Forbidden(_) => 403,
            Error::PayloadTooLarge(_) => 413,
            Error::UnsupportedMediaType(_) => 415,
            Error::Microservice(_) | Error::MicroservicesFailed(_) => 503,
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
