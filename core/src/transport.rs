//! The transport seam and its default ureq-backed implementation.
//!
//! # Design
//! A [`Transport`] performs one attempt: it opens a connection, writes the
//! request and hands back the response head together with a [`BodyStream`].
//! The stream yields the "data", "error" and "end" events of the response
//! body as `Some(Ok(chunk))`, `Some(Err(_))` and `None`.
//!
//! [`UreqTransport`] drives a blocking `ureq::Agent` on tokio's blocking
//! pool. The head is sent back over a `oneshot` channel as soon as it is
//! read, and body chunks follow over a bounded `mpsc` channel, so the calling
//! task only ever awaits. The agent does not follow redirects and never turns
//! an HTTP status into an error.

use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use ureq::http::HeaderMap;

use crate::error::{RequestError, TransportError, TransportErrorKind};
use crate::http::{Headers, Method, TransportRequest, CONTENT_LENGTH};

const READ_CHUNK_SIZE: usize = 8 * 1024;

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, RequestError>> + Send + 'a>>;

/// Performs a single request/response exchange.
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Response head plus the still-streaming body.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: BodyStream,
}

/// Receiving half of a response body.
#[derive(Debug)]
pub struct BodyStream {
    chunks: mpsc::Receiver<Result<Bytes, TransportError>>,
}

impl BodyStream {
    /// Wait for the next body event. `None` marks the end of the body.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.chunks.recv().await
    }
}

/// Sending half of a response body, used by transport implementations.
#[derive(Debug, Clone)]
pub struct BodySender {
    chunks: mpsc::Sender<Result<Bytes, TransportError>>,
}

impl BodySender {
    /// Returns `false` once the receiving side has gone away.
    pub async fn send(&self, chunk: Result<Bytes, TransportError>) -> bool {
        self.chunks.send(chunk).await.is_ok()
    }

    /// Blocking variant for use on a blocking thread.
    pub fn blocking_send(&self, chunk: Result<Bytes, TransportError>) -> bool {
        self.chunks.blocking_send(chunk).is_ok()
    }
}

/// Create a body channel holding at most `capacity` unread chunks. Dropping
/// every [`BodySender`] ends the stream.
pub fn body_channel(capacity: usize) -> (BodySender, BodyStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BodySender { chunks: tx }, BodyStream { chunks: rx })
}

/// Settings for the default transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a whole attempt. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// How many body chunks may be read ahead of the consumer.
    pub body_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            body_buffer: 16,
        }
    }
}

/// [`Transport`] backed by a blocking `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    body_buffer: usize,
}

impl UreqTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_global(config.timeout)
            .build()
            .new_agent();
        Self {
            agent,
            body_buffer: config.body_buffer,
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

type Head = Result<(u16, Headers), TransportError>;

impl Transport for UreqTransport {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
        let agent = self.agent.clone();
        let (sender, body) = body_channel(self.body_buffer);
        Box::pin(async move {
            let (head_tx, head_rx) = oneshot::channel::<Head>();
            tokio::task::spawn_blocking(move || run_blocking(&agent, request, head_tx, sender));

            let (status, headers) = head_rx.await.map_err(|_| {
                TransportError::new(TransportErrorKind::Other, "transport worker stopped")
            })??;
            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn run_blocking(
    agent: &ureq::Agent,
    request: TransportRequest,
    head: oneshot::Sender<Head>,
    body: BodySender,
) {
    let response = match call(agent, &request) {
        Ok(response) => response,
        Err(err) => {
            let _ = head.send(Err(transport_error(err)));
            return;
        }
    };

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());
    if head.send(Ok((status, headers))).is_err() {
        return;
    }

    let mut reader = response.into_body().into_reader();
    let mut buf = vec![0; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if !body.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))) {
                    return;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => {
                body.blocking_send(Err(TransportError::new(TransportErrorKind::Read, err)));
                return;
            }
        }
    }
}

fn call(
    agent: &ureq::Agent,
    request: &TransportRequest,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    let uri = request.uri();
    let body = &request.body[..];
    match request.method {
        Method::Get => with_headers(agent.get(&uri), &request.headers).call(),
        Method::Head => with_headers(agent.head(&uri), &request.headers).call(),
        Method::Options if body.is_empty() => {
            with_headers(agent.options(&uri), &request.headers).call()
        }
        Method::Options => with_headers(agent.options(&uri), &request.headers)
            .force_send_body()
            .send(body),
        Method::Delete if body.is_empty() => {
            with_headers(agent.delete(&uri), &request.headers).call()
        }
        Method::Delete => with_headers(agent.delete(&uri), &request.headers)
            .force_send_body()
            .send(body),
        Method::Post => with_headers(agent.post(&uri), &request.headers).send(body),
        Method::Put => with_headers(agent.put(&uri), &request.headers).send(body),
        Method::Patch => with_headers(agent.patch(&uri), &request.headers).send(body),
    }
}

/// ureq frames the body itself, so `content-length` is left to it.
fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &Headers) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        if name != CONTENT_LENGTH {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
}

fn transport_error(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::Io(_) | ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
            TransportErrorKind::Connect
        }
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, err)
}

/// Flatten a header map, joining repeated headers with `", "`.
fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for name in map.keys() {
        let values: Vec<&str> = map
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        headers.insert(name.as_str().to_string(), values.join(", "));
    }
    headers
}
