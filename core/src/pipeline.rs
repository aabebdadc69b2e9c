//! Turns a streaming transport response into a [`Response`].
//!
//! # Design
//! Every chunk is written to the sink (when one is configured) as it arrives
//! and is also appended to an in-memory buffer. Both are needed: the sink
//! wants bytes as early as possible, while `content_length` and the JSON
//! decode need the complete body. Large bodies are therefore held in memory
//! in full even when streamed.
//!
//! Once the body has ended and a schema applies to a JSON response, the
//! execution's retry budget is zeroed before decoding: a fully received
//! response is never worth another attempt.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::RequestError;
use crate::http::{Method, Response, APPLICATION_JSON, CONTENT_TYPE};
use crate::retry::RetryBudget;
use crate::schema::Schema;
use crate::transport::TransportResponse;

/// A writer shared between the caller and the executions of a request.
pub type StreamSink = Arc<Mutex<dyn AsyncWrite + Send + Unpin>>;

const NO_CONTENT: u16 = 204;
const NOT_MODIFIED: u16 = 304;

pub(crate) struct ResponsePipeline<'a> {
    method: Method,
    sink: Option<&'a StreamSink>,
    schema: Option<&'a dyn Schema>,
}

impl<'a> ResponsePipeline<'a> {
    pub(crate) fn new(
        method: Method,
        sink: Option<&'a StreamSink>,
        schema: Option<&'a dyn Schema>,
    ) -> Self {
        Self {
            method,
            sink,
            schema,
        }
    }

    /// HEAD, 204 and 304 responses have no body to decode.
    fn has_body(&self, status: u16) -> bool {
        self.method != Method::Head && status != NO_CONTENT && status != NOT_MODIFIED
    }

    pub(crate) async fn collect(
        &self,
        response: TransportResponse,
        budget: &mut RetryBudget,
    ) -> Result<Response, RequestError> {
        let TransportResponse {
            status,
            headers,
            mut body,
        } = response;
        let is_json = headers
            .get(CONTENT_TYPE)
            .is_some_and(|value| value.contains(APPLICATION_JSON));

        let mut raw = Vec::new();
        while let Some(chunk) = body.next_chunk().await {
            let chunk = chunk?;
            if let Some(sink) = self.sink {
                sink.lock().await.write_all(&chunk).await.map_err(RequestError::Sink)?;
            }
            raw.extend_from_slice(&chunk);
        }
        if let Some(sink) = self.sink {
            sink.lock().await.flush().await.map_err(RequestError::Sink)?;
        }

        if is_json && self.schema.is_some() {
            budget.exhaust();
        }

        let text = String::from_utf8_lossy(&raw).into_owned();
        let mut json = if is_json && self.has_body(status) {
            Some(serde_json::from_str::<Value>(&text).map_err(RequestError::JsonDecode)?)
        } else {
            None
        };

        if let Some(schema) = self.schema {
            if !is_json {
                return Err(RequestError::InvalidContentType);
            }
            json = Some(schema.validate(json.unwrap_or(Value::Null))?);
        }

        Ok(Response::new(status, headers, text, json))
    }
}
