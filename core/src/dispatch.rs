//! URL resolution and transport selection.
//!
//! # Design
//! `resolve` runs once per execution, before the first attempt, so an
//! unsupported scheme or a malformed URL is terminal and never retried. The
//! registry is fixed to the two schemes in [`Protocol`]; callers may swap the
//! transport behind either of them but cannot add new schemes.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::error::RequestError;
use crate::http::{Headers, TransportRequest, APPLICATION_JSON, CONTENT_LENGTH, CONTENT_TYPE};
use crate::request::RequestConfig;
use crate::transport::Transport;

/// Schemes the dispatcher knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Map a URL scheme (without the trailing colon) to a protocol.
    pub fn from_scheme(scheme: &str) -> Result<Self, RequestError> {
        match scheme {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(RequestError::UnsupportedProtocol(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transport per supported protocol.
#[derive(Clone)]
pub struct ProtocolRegistry {
    http: Arc<dyn Transport>,
    https: Arc<dyn Transport>,
}

impl ProtocolRegistry {
    /// Serve both protocols with the same transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            http: Arc::clone(&transport),
            https: transport,
        }
    }

    pub fn with(mut self, protocol: Protocol, transport: Arc<dyn Transport>) -> Self {
        match protocol {
            Protocol::Http => self.http = transport,
            Protocol::Https => self.https = transport,
        }
        self
    }

    pub fn get(&self, protocol: Protocol) -> &Arc<dyn Transport> {
        match protocol {
            Protocol::Http => &self.http,
            Protocol::Https => &self.https,
        }
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry").finish_non_exhaustive()
    }
}

/// A resolved target: the transport to use and the request to give it.
pub(crate) struct Dispatch {
    pub transport: Arc<dyn Transport>,
    pub request: TransportRequest,
}

/// Resolve `config` into transport-ready options.
pub(crate) fn resolve(
    registry: &ProtocolRegistry,
    config: &RequestConfig,
) -> Result<Dispatch, RequestError> {
    let url = Url::parse(&config.url)?;
    let protocol = Protocol::from_scheme(url.scheme())?;
    let host = url
        .host_str()
        .ok_or_else(|| RequestError::MissingHost(config.url.clone()))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| RequestError::MissingHost(config.url.clone()))?;

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    let body = serialize_body(config)?;
    let headers = with_default_headers(&config.headers, body.len());

    Ok(Dispatch {
        transport: Arc::clone(registry.get(protocol)),
        request: TransportRequest {
            protocol,
            host,
            port,
            path,
            headers,
            method: config.method,
            body,
        },
    })
}

fn serialize_body(config: &RequestConfig) -> Result<Bytes, RequestError> {
    match &config.body {
        None | Some(serde_json::Value::Null) => Ok(Bytes::new()),
        Some(value) => serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(RequestError::Serialize),
    }
}

/// A caller-provided `content-type` disables both defaults.
fn with_default_headers(headers: &Headers, body_len: usize) -> Headers {
    let mut headers = headers.clone();
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
        headers.insert(CONTENT_LENGTH.to_string(), body_len.to_string());
    }
    headers
}
