//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::client::Reqex;
use crate::dispatch::Protocol;
use crate::error::{RequestError, TransportError, TransportErrorKind};
use crate::http::{Headers, TransportRequest};
use crate::retry::{DelayFuture, RetryLogger, Timer};
use crate::transport::{body_channel, Transport, TransportFuture, TransportResponse};

/// One scripted outcome of [`ScriptedTransport::send`].
pub(crate) enum Step {
    Respond {
        status: u16,
        content_type: &'static str,
        body: String,
    },
    Refuse,
}

pub(crate) fn json_response(status: u16, body: &str) -> Step {
    Step::Respond {
        status,
        content_type: "application/json",
        body: body.to_string(),
    }
}

pub(crate) fn refused() -> Step {
    Step::Refuse
}

/// Plays back a fixed list of outcomes and records what it was sent. Refuses
/// once the script runs out.
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
        self.sent.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Refuse);
        Box::pin(async move {
            match step {
                Step::Refuse => Err(RequestError::from(TransportError::new(
                    TransportErrorKind::Connect,
                    "connection refused",
                ))),
                Step::Respond {
                    status,
                    content_type,
                    body,
                } => {
                    let (sender, stream) = body_channel(1);
                    if !body.is_empty() {
                        sender.send(Ok(Bytes::from(body))).await;
                    }
                    let mut headers = Headers::new();
                    headers.insert("content-type".to_string(), content_type.to_string());
                    Ok(TransportResponse {
                        status,
                        headers,
                        body: stream,
                    })
                }
            }
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingLogger {
    messages: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl RetryLogger for RecordingLogger {
    fn warn(&self, message: &str, _error: &RequestError) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Records requested delays and returns immediately.
#[derive(Default)]
pub(crate) struct RecordingTimer {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Timer for RecordingTimer {
    fn delay(&self, duration: Duration) -> DelayFuture {
        self.delays.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

pub(crate) fn scripted_client(steps: Vec<Step>) -> (Reqex, Arc<ScriptedTransport>) {
    scripted_client_with_logger(steps, Arc::new(RecordingLogger::default()))
}

pub(crate) fn scripted_client_with_logger(
    steps: Vec<Step>,
    logger: Arc<RecordingLogger>,
) -> (Reqex, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(steps));
    let client = Reqex::builder()
        .transport(Protocol::Http, transport.clone())
        .transport(Protocol::Https, transport.clone())
        .logger(logger)
        .timer(Arc::new(RecordingTimer::default()))
        .build();
    (client, transport)
}
