//! Lazy, fluently configured HTTP(S) requests.
//!
//! # Overview
//! A [`Request`] is built up with chainable methods and does nothing until
//! it is awaited. Each execution resolves the URL, performs attempts with
//! bounded retry and backoff on transport failures, optionally streams the
//! body into a sink, and decodes and validates JSON responses.
//!
//! ```no_run
//! # async fn demo() -> Result<(), reqex::RequestError> {
//! use reqex::{FieldType, ObjectSchema, RetryOptions};
//!
//! let response = reqex::get("http://localhost:3000/")
//!     .retry(RetryOptions::new(3).interval(1.0))?
//!     .validate(ObjectSchema::new().field("data", FieldType::String))
//!     .await?;
//! assert_eq!(response.json.unwrap()["data"], "some data");
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - `request` holds configuration; `client` runs executions.
//! - `dispatch` -> `transport` -> `pipeline` is one attempt; `retry` loops
//!   over attempts.
//! - The transport, schema engine, retry logger and timer are traits so
//!   tests and callers can replace them.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod schema;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::sync::OnceLock;

pub use client::{Reqex, ReqexBuilder};
pub use dispatch::{Protocol, ProtocolRegistry};
pub use error::{RequestError, TransportError, TransportErrorKind};
pub use http::{Headers, Method, Response, TransportRequest};
pub use pipeline::StreamSink;
pub use request::{Request, ResponseFuture};
pub use retry::{RetryLogger, RetryOptions, RetryPolicy, Timer, TokioTimer, TracingLogger};
pub use schema::{FieldType, ObjectSchema, Schema, ValidationError};
pub use transport::{
    body_channel, BodySender, BodyStream, Transport, TransportConfig, TransportResponse,
    UreqTransport,
};

/// The client behind the free functions, created on first use.
pub fn default_client() -> &'static Reqex {
    static CLIENT: OnceLock<Reqex> = OnceLock::new();
    CLIENT.get_or_init(Reqex::new)
}

pub fn request(method: Method, url: impl Into<String>) -> Request {
    default_client().request(method, url)
}

pub fn get(url: impl Into<String>) -> Request {
    default_client().get(url)
}

pub fn head(url: impl Into<String>) -> Request {
    default_client().head(url)
}

pub fn options(url: impl Into<String>) -> Request {
    default_client().options(url)
}

pub fn post(url: impl Into<String>) -> Request {
    default_client().post(url)
}

pub fn put(url: impl Into<String>) -> Request {
    default_client().put(url)
}

pub fn patch(url: impl Into<String>) -> Request {
    default_client().patch(url)
}

pub fn delete(url: impl Into<String>) -> Request {
    default_client().delete(url)
}
