//! Configurable HTTP server for exercising the request engine end to end.
//!
//! # Design
//! Every route answers with the same configured status, content type and
//! body, and records what it received. `FlakyListener` drops a configured
//! number of accepted connections before handing any to axum, which looks
//! like a transport failure to the client and drives its retry loop.

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    serve::Listener,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::RwLock,
};

/// What the server answers with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerOptions {
    pub status: u16,
    pub content_type: String,
    /// Raw response body. `None` sends an empty body.
    pub body: Option<String>,
    /// Number of connections to drop before serving any.
    #[serde(default)]
    pub fails: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: Some(r#"{"data":"some data"}"#.to_string()),
            fails: 0,
        }
    }
}

impl ServerOptions {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body.to_string()),
            ..Self::default()
        }
    }
}

/// A request as seen by the server.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub type Recorded = Arc<RwLock<Vec<RecordedRequest>>>;

#[derive(Clone)]
struct AppState {
    options: Arc<ServerOptions>,
    recorded: Recorded,
}

pub fn app(options: ServerOptions, recorded: Recorded) -> Router {
    Router::new().fallback(respond).with_state(AppState {
        options: Arc::new(options),
        recorded,
    })
}

async fn respond(
    State(state): State<AppState>,
    method: Method,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default(),
        headers: headers
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    state.recorded.write().await.push(recorded);

    let options = &state.options;
    let status = StatusCode::from_u16(options.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, options.content_type.clone())],
        options.body.clone().unwrap_or_default(),
    )
}

/// Wraps a `TcpListener` and closes the first `fails` connections it
/// accepts.
pub struct FlakyListener {
    inner: TcpListener,
    fails: usize,
    dropped: Arc<AtomicUsize>,
}

impl FlakyListener {
    pub fn new(inner: TcpListener, fails: usize) -> Self {
        Self {
            inner,
            fails,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of connections dropped so far.
    pub fn dropped(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.dropped)
    }
}

impl Listener for FlakyListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, addr) = Listener::accept(&mut self.inner).await;
            if self.dropped.load(Ordering::SeqCst) < self.fails {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                drop(stream);
                continue;
            }
            return (stream, addr);
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

pub async fn run(listener: TcpListener, options: ServerOptions) -> Result<(), std::io::Error> {
    let fails = options.fails;
    serve(FlakyListener::new(listener, fails), options, Recorded::default()).await
}

async fn serve(
    listener: FlakyListener,
    options: ServerOptions,
    recorded: Recorded,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app(options, recorded)).await
}

/// A server running on a random local port.
pub struct TestServer {
    pub url: String,
    pub recorded: Recorded,
    pub dropped: Arc<AtomicUsize>,
}

impl TestServer {
    /// Bind `127.0.0.1:0` and serve `options` on a background task.
    pub async fn spawn(options: ServerOptions) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let listener = FlakyListener::new(listener, options.fails);
        let dropped = listener.dropped();
        let recorded = Recorded::default();

        tokio::spawn(serve(listener, options, Arc::clone(&recorded)));

        Ok(Self {
            url: format!("http://{addr}"),
            recorded,
            dropped,
        })
    }

    /// Requests that reached the router.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.read().await.clone()
    }

    pub fn dropped_connections(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}
