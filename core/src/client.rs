//! Request factory and execution entry point.
//!
//! # Design
//! `Reqex` holds the collaborators every execution needs: the protocol
//! registry, the retry logger and the backoff timer. It is cheap to clone
//! (one `Arc`) and carries no per-request state; each [`Request`] it creates
//! owns its own configuration and each execution its own retry budget.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::dispatch::{self, Protocol, ProtocolRegistry};
use crate::error::RequestError;
use crate::http::{Method, Response};
use crate::pipeline::ResponsePipeline;
use crate::request::{Request, RequestConfig};
use crate::retry::{RetryController, RetryLogger, Timer, TokioTimer, TracingLogger};
use crate::transport::{Transport, TransportConfig, UreqTransport};

/// Creates requests and runs their executions.
#[derive(Clone)]
pub struct Reqex {
    inner: Arc<Inner>,
}

struct Inner {
    registry: ProtocolRegistry,
    logger: Arc<dyn RetryLogger>,
    timer: Arc<dyn Timer>,
}

impl Reqex {
    /// A client with the default ureq transport, `tracing` logger and tokio
    /// timer.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ReqexBuilder {
        ReqexBuilder::default()
    }

    pub fn request(&self, method: Method, url: impl Into<String>) -> Request {
        Request::new(self.clone(), method, url)
    }

    pub fn get(&self, url: impl Into<String>) -> Request {
        self.request(Method::Get, url)
    }

    pub fn head(&self, url: impl Into<String>) -> Request {
        self.request(Method::Head, url)
    }

    pub fn options(&self, url: impl Into<String>) -> Request {
        self.request(Method::Options, url)
    }

    pub fn post(&self, url: impl Into<String>) -> Request {
        self.request(Method::Post, url)
    }

    pub fn put(&self, url: impl Into<String>) -> Request {
        self.request(Method::Put, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> Request {
        self.request(Method::Patch, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> Request {
        self.request(Method::Delete, url)
    }

    /// Run one complete execution of `config`.
    pub(crate) async fn execute(&self, config: &RequestConfig) -> Result<Response, RequestError> {
        let span = tracing::debug_span!(
            "request",
            method = %config.method,
            url = %config.url,
            execution_id = %Uuid::new_v4(),
        );
        async {
            let dispatch = dispatch::resolve(&self.inner.registry, config)?;
            let pipeline =
                ResponsePipeline::new(config.method, config.sink.as_ref(), config.schema.as_deref());
            RetryController::new(
                config.retry,
                config.sink.is_some(),
                self.inner.logger.as_ref(),
                self.inner.timer.as_ref(),
            )
            .run(&dispatch, &pipeline)
            .await
        }
        .instrument(span)
        .await
    }
}

impl Default for Reqex {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures the collaborators of a [`Reqex`].
#[derive(Default)]
pub struct ReqexBuilder {
    transport_config: TransportConfig,
    http: Option<Arc<dyn Transport>>,
    https: Option<Arc<dyn Transport>>,
    logger: Option<Arc<dyn RetryLogger>>,
    timer: Option<Arc<dyn Timer>>,
}

impl ReqexBuilder {
    /// Settings for the default transport. Ignored for protocols given an
    /// explicit transport.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn transport(mut self, protocol: Protocol, transport: Arc<dyn Transport>) -> Self {
        match protocol {
            Protocol::Http => self.http = Some(transport),
            Protocol::Https => self.https = Some(transport),
        }
        self
    }

    pub fn logger(mut self, logger: Arc<dyn RetryLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn build(self) -> Reqex {
        let registry = match (self.http, self.https) {
            (Some(http), Some(https)) => ProtocolRegistry::new(http).with(Protocol::Https, https),
            (http, https) => {
                let default: Arc<dyn Transport> = Arc::new(UreqTransport::new(&self.transport_config));
                let mut registry = ProtocolRegistry::new(default);
                if let Some(http) = http {
                    registry = registry.with(Protocol::Http, http);
                }
                if let Some(https) = https {
                    registry = registry.with(Protocol::Https, https);
                }
                registry
            }
        };

        Reqex {
            inner: Arc::new(Inner {
                registry,
                logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
                timer: self.timer.unwrap_or_else(|| Arc::new(TokioTimer)),
            }),
        }
    }
}
