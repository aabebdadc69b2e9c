//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port and drives the
//! default ureq transport over real HTTP, so dispatch, transport, retry and
//! the response pipeline are exercised together.

use std::sync::{Arc, Mutex};

use mock_server::{ServerOptions, TestServer};
use reqex::{FieldType, ObjectSchema, Reqex, RequestError, RetryLogger, RetryOptions};

#[derive(Default)]
struct CountingLogger {
    messages: Mutex<Vec<String>>,
}

impl RetryLogger for CountingLogger {
    fn warn(&self, message: &str, error: &RequestError) {
        assert!(error.is_retryable());
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn client_with_logger() -> (Reqex, Arc<CountingLogger>) {
    let logger = Arc::new(CountingLogger::default());
    let client = Reqex::builder().logger(logger.clone()).build();
    (client, logger)
}

fn data_schema() -> ObjectSchema {
    ObjectSchema::new().field("data", FieldType::String)
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_protocol() {
    let err = reqex::get("ftp://localhost:3000").await.unwrap_err();
    assert_eq!(err.to_string(), "Unsupported protocol: ftp");
}

#[tokio::test]
async fn unsupported_protocol_reaches_catch() {
    let mut message = None;
    let response = reqex::get("ftp://localhost:3000")
        .catch(|err| message = Some(err.to_string()))
        .await;
    assert!(response.is_none());
    assert_eq!(message.as_deref(), Some("Unsupported protocol: ftp"));
}

#[test]
fn invalid_retry_options_fail_synchronously() {
    let err = reqex::get("ftp://localhost:3000")
        .retry(RetryOptions::new(2).interval(-1.0))
        .unwrap_err();
    assert_eq!(err.to_string(), "Retry interval must not be less than 0");

    let err = reqex::get("ftp://localhost:3000")
        .retry(RetryOptions::new(-2))
        .unwrap_err();
    assert_eq!(err.to_string(), "Retry attempts must not be less than 0");
}

#[tokio::test]
async fn validation_failure_is_terminal() {
    let server = TestServer::spawn(ServerOptions::json(
        200,
        &serde_json::json!({"company": "my-company"}),
    ))
    .await
    .unwrap();

    let err = reqex::get(&server.url)
        .retry(RetryOptions::new(3).interval(0.0))
        .unwrap()
        .validate(ObjectSchema::new().field("name", FieldType::String))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Validation failed: key 'name' is missing, but 'string' type is required."
    );
    assert_eq!(server.requests().await.len(), 1);
}

#[tokio::test]
async fn schema_on_html_is_invalid_content_type() {
    let server = TestServer::spawn(ServerOptions {
        content_type: "text/html".to_string(),
        body: Some("<p>html response</p>".to_string()),
        ..ServerOptions::default()
    })
    .await
    .unwrap();

    let err = reqex::get(&server.url)
        .validate(ObjectSchema::new().field("name", FieldType::String))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::InvalidContentType));
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_with_validation() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();

    let response = reqex::get(&server.url).validate(data_schema()).await.unwrap();

    assert!(response.ok);
    assert_eq!(response.status, 200);
    assert_eq!(response.json.as_ref().unwrap()["data"], "some data");
    assert_eq!(response.content_length, response.body.len());
}

#[tokio::test]
async fn get_sends_custom_headers_and_json_defaults() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();

    let response = reqex::get(&server.url)
        .headers([("accept-language", "ENG")])
        .validate(data_schema())
        .await
        .unwrap();
    assert_eq!(response.json.unwrap()["data"], "some data");

    let requests = server.requests().await;
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].headers["accept-language"], "ENG");
    assert_eq!(requests[0].headers["content-type"], "application/json");
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = TestServer::spawn(ServerOptions::json(
        201,
        &serde_json::json!({"created": "success"}),
    ))
    .await
    .unwrap();

    let response = reqex::post(&server.url)
        .body(serde_json::json!({"data": "some-data"}))
        .unwrap()
        .validate(ObjectSchema::new().field("created", FieldType::String))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.json.unwrap()["created"], "success");
    let requests = server.requests().await;
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].body, r#"{"data":"some-data"}"#);
}

#[tokio::test]
async fn put_request() {
    let server = TestServer::spawn(ServerOptions::json(
        200,
        &serde_json::json!({"updated": "success"}),
    ))
    .await
    .unwrap();

    let response = reqex::put(&server.url)
        .body(serde_json::json!({"data": "some-data"}))
        .unwrap()
        .validate(ObjectSchema::new().field("updated", FieldType::String))
        .await
        .unwrap();

    assert_eq!(response.json.unwrap()["updated"], "success");
}

#[tokio::test]
async fn delete_with_no_content() {
    let server = TestServer::spawn(ServerOptions {
        status: 204,
        body: None,
        ..ServerOptions::default()
    })
    .await
    .unwrap();

    let response = reqex::delete(&server.url)
        .body(serde_json::json!({"data": "some-data"}))
        .unwrap()
        .await
        .unwrap();

    assert!(response.json.is_none());
    assert_eq!(response.status, 204);
    assert_eq!(response.content_length, 0);
}

#[tokio::test]
async fn head_against_json_endpoint_has_no_json() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();

    let response = reqex::head(&server.url).await.unwrap();

    assert!(response.ok);
    assert!(response.json.is_none());
    assert!(response.body.is_empty());
    assert_eq!(server.requests().await[0].method, "HEAD");
}

#[tokio::test]
async fn options_sends_its_body() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();

    reqex::options(&server.url)
        .body(serde_json::json!({"a": 1}))
        .unwrap()
        .await
        .unwrap();

    let requests = server.requests().await;
    assert_eq!(requests[0].method, "OPTIONS");
    assert_eq!(requests[0].body, r#"{"a":1}"#);
}

#[tokio::test]
async fn caller_content_length_is_replaced_by_the_real_one() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();

    reqex::post(&server.url)
        .headers([("content-type", "application/json"), ("content-length", "999")])
        .body(serde_json::json!({"data": "some-data"}))
        .unwrap()
        .await
        .unwrap();

    let requests = server.requests().await;
    assert_eq!(requests[0].body, r#"{"data":"some-data"}"#);
    assert_eq!(requests[0].headers["content-length"], "20");
}

#[tokio::test]
async fn error_statuses_resolve_with_ok_false() {
    let server = TestServer::spawn(ServerOptions::json(
        404,
        &serde_json::json!({"error": "not found"}),
    ))
    .await
    .unwrap();

    let response = reqex::get(&server.url).await.unwrap();
    assert!(!response.ok);
    assert_eq!(response.json.unwrap()["error"], "not found");
}

#[tokio::test]
async fn finally_runs_after_the_response() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();
    let mut settled = false;

    let response = reqex::get(&server.url)
        .validate(data_schema())
        .finally(|| settled = true)
        .await
        .unwrap();

    assert!(settled);
    assert_eq!(response.json.unwrap()["data"], "some data");
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retries_until_the_server_answers() {
    let server = TestServer::spawn(ServerOptions {
        fails: 2,
        ..ServerOptions::default()
    })
    .await
    .unwrap();
    let (client, logger) = client_with_logger();

    let response = client
        .get(&server.url)
        .retry(RetryOptions::new(3).interval(1.0).log_on_retry(true))
        .unwrap()
        .validate(data_schema())
        .await
        .unwrap();

    assert_eq!(response.json.unwrap()["data"], "some data");
    assert_eq!(server.dropped_connections(), 2);
    let messages = logger.messages.lock().unwrap().clone();
    assert_eq!(messages, vec!["Request has failed, retry in 1 sec."; 2]);
}

#[tokio::test]
async fn retries_without_logging() {
    let server = TestServer::spawn(ServerOptions {
        fails: 2,
        ..ServerOptions::default()
    })
    .await
    .unwrap();
    let (client, logger) = client_with_logger();

    let response = client
        .get(&server.url)
        .retry(RetryOptions::new(3).interval(1.0).log_on_retry(false))
        .unwrap()
        .validate(data_schema())
        .await
        .unwrap();

    assert_eq!(response.json.unwrap()["data"], "some data");
    assert!(logger.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn gives_up_when_budget_runs_out() {
    let server = TestServer::spawn(ServerOptions {
        fails: 5,
        ..ServerOptions::default()
    })
    .await
    .unwrap();

    let err = reqex::get(&server.url)
        .retry(RetryOptions::new(1).interval(0.0))
        .unwrap()
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Transport(_)));
    assert_eq!(server.dropped_connections(), 2);
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pipes_response_to_the_sink() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();
    let sink = Arc::new(tokio::sync::Mutex::new(Vec::<u8>::new()));

    let response = reqex::get(&server.url)
        .pipe_shared(sink.clone())
        .retry(RetryOptions::new(3).interval(1.0).log_on_retry(true))
        .unwrap()
        .validate(data_schema())
        .await
        .unwrap();

    assert_eq!(response.json.unwrap()["data"], "some data");
    assert_eq!(&sink.lock().await[..], br#"{"data":"some data"}"#);
}

#[tokio::test]
async fn streaming_overrides_retries() {
    let server = TestServer::spawn(ServerOptions {
        fails: 1,
        ..ServerOptions::default()
    })
    .await
    .unwrap();
    let (client, logger) = client_with_logger();

    let err = client
        .get(&server.url)
        .pipe(tokio::io::sink())
        .retry(RetryOptions::new(3).interval(0.0))
        .unwrap()
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(server.dropped_connections(), 1);
    assert!(server.requests().await.is_empty());
    assert!(logger.messages.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Deferred execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn awaiting_twice_executes_twice() {
    let server = TestServer::spawn(ServerOptions::default()).await.unwrap();
    let request = reqex::get(&server.url).validate(data_schema());
    assert!(server.requests().await.is_empty());

    let first = (&request).await.unwrap();
    let second = (&request).await.unwrap();

    assert_eq!(first.json, second.json);
    assert_eq!(first.status, second.status);
    assert_eq!(server.requests().await.len(), 2);
}
