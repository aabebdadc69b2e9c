//! The fluent request builder and its deferred execution.
//!
//! # Design
//! A [`Request`] is configuration only. Nothing touches the network until
//! the request is consumed: awaited (by value or by reference), or passed
//! through [`Request::send`], [`Request::then`], [`Request::catch`] or
//! [`Request::finally`]. Every consumption snapshots the configuration and
//! runs a complete, independent execution, so awaiting `&request` twice
//! performs two executions with two retry loops and, when streaming, writes
//! the body to the sink twice. Results are not memoized.
//!
//! Builder methods take `self` by value. Reconfiguring a request after it
//! has been consumed is unsupported; since executions work on a snapshot it
//! only affects later consumptions.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::client::Reqex;
use crate::error::RequestError;
use crate::http::{Headers, Method, Response};
use crate::pipeline::StreamSink;
use crate::retry::{RetryOptions, RetryPolicy};
use crate::schema::Schema;

/// Future returned by every consumption of a [`Request`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response, RequestError>> + Send>>;

/// Everything an execution needs to know about a request.
#[derive(Clone)]
pub(crate) struct RequestConfig {
    pub url: String,
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Value>,
    pub retry: RetryPolicy,
    pub sink: Option<StreamSink>,
    pub schema: Option<Arc<dyn Schema>>,
}

impl RequestConfig {
    pub(crate) fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Headers::new(),
            body: None,
            retry: RetryPolicy::default(),
            sink: None,
            schema: None,
        }
    }
}

/// A configured, not yet executed HTTP request.
#[must_use = "requests do nothing until they are awaited"]
pub struct Request {
    client: Reqex,
    config: RequestConfig,
}

impl Request {
    pub(crate) fn new(client: Reqex, method: Method, url: impl Into<String>) -> Self {
        Self {
            client,
            config: RequestConfig::new(url, method),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn method(&self) -> Method {
        self.config.method
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry
    }

    /// Set the JSON body. Fails on GET requests.
    pub fn body<T: Serialize>(mut self, body: T) -> Result<Self, RequestError> {
        if !self.config.method.allows_body() {
            return Err(RequestError::MethodNotAllowed(self.config.method));
        }
        self.config.body = Some(serde_json::to_value(body).map_err(RequestError::Serialize)?);
        Ok(self)
    }

    /// Retry transport failures. Bounds are checked here, not at execution.
    pub fn retry(mut self, options: RetryOptions) -> Result<Self, RequestError> {
        self.config.retry = self.config.retry.apply(&options)?;
        Ok(self)
    }

    /// Stream the response body into `writer` while it is received. Disables
    /// retries.
    pub fn pipe<W>(self, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.pipe_shared(Arc::new(Mutex::new(writer)))
    }

    /// Like [`Request::pipe`], for a sink the caller keeps a handle to.
    pub fn pipe_shared(mut self, sink: StreamSink) -> Self {
        self.config.sink = Some(sink);
        self
    }

    /// Replace all headers. A `content-type` entry suppresses the JSON
    /// defaults added at execution. A `content-length` entry is never sent:
    /// the transport frames the body and sets its own.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.config.headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.config
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Validate JSON responses against `schema`.
    pub fn validate<S>(mut self, schema: S) -> Self
    where
        S: Schema + 'static,
    {
        self.config.schema = Some(Arc::new(schema));
        self
    }

    /// Start a fresh execution.
    pub fn send(&self) -> ResponseFuture {
        let client = self.client.clone();
        let config = self.config.clone();
        Box::pin(async move { client.execute(&config).await })
    }

    /// Execute and map a successful response.
    pub async fn then<F, T>(&self, on_response: F) -> Result<T, RequestError>
    where
        F: FnOnce(Response) -> T,
    {
        self.send().await.map(on_response)
    }

    /// Execute and hand a failure to `on_error`.
    pub async fn catch<F>(&self, on_error: F) -> Option<Response>
    where
        F: FnOnce(RequestError),
    {
        match self.send().await {
            Ok(response) => Some(response),
            Err(err) => {
                on_error(err);
                None
            }
        }
    }

    /// Execute and run `on_settled` whatever the outcome.
    pub async fn finally<F>(&self, on_settled: F) -> Result<Response, RequestError>
    where
        F: FnOnce(),
    {
        let result = self.send().await;
        on_settled();
        result
    }
}

impl IntoFuture for Request {
    type Output = Result<Response, RequestError>;
    type IntoFuture = ResponseFuture;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.client.execute(&self.config).await })
    }
}

impl IntoFuture for &Request {
    type Output = Result<Response, RequestError>;
    type IntoFuture = ResponseFuture;

    fn into_future(self) -> Self::IntoFuture {
        self.send()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.config.method.as_str())
            .field("url", &self.config.url)
            .field("headers", &self.config.headers)
            .field("retry", &self.config.retry)
            .field("streaming", &self.config.sink.is_some())
            .field("validated", &self.config.schema.is_some())
            .finish()
    }
}
