//! HTTP data types shared by the dispatcher, transports and the pipeline.
//!
//! # Design
//! Requests and responses are described as plain data with owned fields.
//! `TransportRequest` is what a [`Transport`](crate::transport::Transport)
//! receives after dispatch; `Response` is what a successful execution
//! resolves to. Header names are stored lower-cased so lookups such as
//! `content-type` never depend on the caller's casing.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dispatch::Protocol;

/// Header name to value mapping. Names are lower-case.
pub type Headers = BTreeMap<String, String>;

pub(crate) const CONTENT_TYPE: &str = "content-type";
pub(crate) const CONTENT_LENGTH: &str = "content-length";
pub(crate) const APPLICATION_JSON: &str = "application/json";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// GET and HEAD requests never carry a body.
    pub fn allows_body(&self) -> bool {
        !matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request, ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Path including the query string, if any.
    pub path: String,
    pub headers: Headers,
    pub method: Method,
    /// Serialized JSON body; empty when the request has none.
    pub body: Bytes,
}

impl TransportRequest {
    /// Reassemble an absolute URI from the resolved parts.
    pub fn uri(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

/// The outcome of a successful execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// `status < 400`.
    pub ok: bool,
    pub headers: Headers,
    /// Byte length of the raw body, not of the decoded JSON.
    pub content_length: usize,
    pub body: String,
    /// Decoded body. Only present for `application/json` responses whose
    /// status is not 204.
    pub json: Option<Value>,
}

impl Response {
    pub(crate) fn new(status: u16, headers: Headers, body: String, json: Option<Value>) -> Self {
        Self {
            status,
            ok: status < 400,
            headers,
            content_length: body.len(),
            body,
            json,
        }
    }

    /// Deserialize the decoded JSON into `T`. A missing `json` is treated as
    /// `null`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.json.clone().unwrap_or(Value::Null))
    }
}
