//! Error types for the typed JSON client.
//!
//! # Design
//! Each variant names the stage that failed so callers can tell a bad base
//! URL from a network failure, a non-200 answer or a body that did not match
//! `T`. Status errors keep the URL, status line and raw body text for
//! debugging. Transport errors keep the transport's own error as `source`
//! so callers can downcast it.

use thiserror::Error;

use crate::context::ContextError;

/// Error type returned by `Transport` implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `JsonClient` construction and requests.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL given at construction could not be parsed.
    #[error("parsing url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The path or method could not be combined into a request.
    #[error("creating request: {0}")]
    RequestBuild(String),

    /// The request payload could not be serialized to JSON.
    #[error("serializing request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The transport failed before producing a response.
    #[error("calling {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The bound context was cancelled or its deadline passed.
    #[error("calling {url}: {source}")]
    Cancelled {
        url: String,
        #[source]
        source: ContextError,
    },

    /// The server answered with anything other than 200.
    #[error("calling {url}:\nstatus: {status_line}\nresponse body: {body}")]
    Status {
        url: String,
        status: u16,
        status_line: String,
        body: String,
    },

    /// A 200 response body did not decode into the result type.
    #[error("decoding response from {url}: {source}")]
    Deserialization {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// The HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The context error for `Cancelled` errors.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            ClientError::Cancelled { source, .. } => Some(*source),
            _ => None,
        }
    }
}
