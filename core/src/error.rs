//! Error types for request configuration and execution.
//!
//! # Design
//! One `RequestError` enum covers both phases of a request's life. Variants
//! raised while configuring (`InvalidRetryAttempts`, `InvalidRetryInterval`,
//! `MethodNotAllowed`, `Serialize`) surface from the builder methods
//! themselves; everything else surfaces from an execution. Only `Transport`
//! takes part in the retry loop, see [`RequestError::is_retryable`].
//!
//! The messages of `UnsupportedProtocol`, the retry variants,
//! `InvalidContentType` and `Validation` are part of the public contract and
//! must not change.

use std::fmt;

use thiserror::Error;

use crate::http::Method;
use crate::schema::ValidationError;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned while configuring or executing a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The URL parsed but names no host to connect to.
    #[error("Invalid URL: {0} has no host")]
    MissingHost(String),

    /// The URL scheme is neither `http` nor `https`.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Retry attempts must not be less than 0")]
    InvalidRetryAttempts,

    #[error("Retry interval must not be less than 0")]
    InvalidRetryInterval,

    /// A body was set on a method that does not carry one.
    #[error("Request body is not allowed for {0} requests")]
    MethodNotAllowed(Method),

    /// The request body could not be represented as JSON.
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Connecting, writing the request or reading the response failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A schema was configured but the response is not JSON.
    #[error("Invalid content type: expected application/json")]
    InvalidContentType,

    /// The JSON response did not satisfy the configured schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The response claimed to be JSON but its body did not parse.
    #[error("Failed to decode JSON response: {0}")]
    JsonDecode(#[source] serde_json::Error),

    /// Writing a response chunk to the stream sink failed.
    #[error("Failed to write response to stream: {0}")]
    Sink(#[source] std::io::Error),
}

impl RequestError {
    /// Whether another attempt may fix this error.
    ///
    /// Only transport failures qualify: every other error is raised either
    /// before the first attempt or after a complete response was received.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Transport(_))
    }
}

/// Which stage of an attempt a transport failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Read,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Read => "read",
            TransportErrorKind::Other => "transport",
        };
        f.write_str(text)
    }
}

/// A failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
#[error("{kind} error: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    source: BoxError,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_messages_are_stable() {
        assert_eq!(
            RequestError::UnsupportedProtocol("ftp".to_string()).to_string(),
            "Unsupported protocol: ftp"
        );
        assert_eq!(
            RequestError::InvalidRetryAttempts.to_string(),
            "Retry attempts must not be less than 0"
        );
        assert_eq!(
            RequestError::InvalidRetryInterval.to_string(),
            "Retry interval must not be less than 0"
        );
        assert_eq!(
            RequestError::InvalidContentType.to_string(),
            "Invalid content type: expected application/json"
        );
        assert_eq!(
            RequestError::MethodNotAllowed(Method::Get).to_string(),
            "Request body is not allowed for GET requests"
        );
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = RequestError::from(ValidationError::new("Validation failed: nope."));
        assert_eq!(err.to_string(), "Validation failed: nope.");
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        let transport = RequestError::from(TransportError::new(
            TransportErrorKind::Connect,
            "connection refused",
        ));
        assert!(transport.is_retryable());
        assert_eq!(transport.to_string(), "connect error: connection refused");

        assert!(!RequestError::InvalidContentType.is_retryable());
        assert!(!RequestError::UnsupportedProtocol("ftp".into()).is_retryable());
        assert!(!RequestError::from(ValidationError::new("bad")).is_retryable());
    }
}
