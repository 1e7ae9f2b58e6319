//! Drives the JSON/X-Amz-Target HTTP surface end-to-end through the axum
//! router via `tower::ServiceExt::oneshot`, rather than binding a real
//! socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqs_broker::clock::{Clock, TestClock};
use sqs_broker::sqs::manager::QueueManager;
use sqs_broker::sqs::server::{self, SqsService};
use tower::ServiceExt;

fn router() -> axum::Router {
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
    let manager = Arc::new(QueueManager::new(
        clock,
        "http://localhost:9324/000000000000".into(),
        "us-east-1".into(),
        "000000000000".into(),
    ));
    let service = Arc::new(SqsService::new(manager));
    server::create_router(service)
}

async fn call(router: axum::Router, action: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/x-amz-json-1.0")
        .header("x-amz-target", format!("AmazonSQS.{action}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn create_send_receive_delete_round_trip() {
    let router = router();

    let (status, body) = call(
        router.clone(),
        "CreateQueue",
        json!({ "QueueName": "orders" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let queue_url = body["QueueUrl"].as_str().unwrap().to_string();

    let (status, body) = call(
        router.clone(),
        "SendMessage",
        json!({ "QueueUrl": queue_url, "MessageBody": "hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["MD5OfMessageBody"], "5d41402abc4b2a76b9719d911017c592");

    let (status, body) = call(
        router.clone(),
        "ReceiveMessage",
        json!({ "QueueUrl": queue_url, "MaxNumberOfMessages": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["Messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["Body"], "hello");
    let receipt_handle = messages[0]["ReceiptHandle"].as_str().unwrap().to_string();

    let (status, _body) = call(
        router.clone(),
        "DeleteMessage",
        json!({ "QueueUrl": queue_url, "ReceiptHandle": receipt_handle }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_status, body) = call(
        router.clone(),
        "ReceiveMessage",
        json!({ "QueueUrl": queue_url, "MaxNumberOfMessages": 1 }),
    )
    .await;
    assert!(body["Messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_action_returns_invalid_action_error() {
    let router = router();
    let (status, body) = call(router, "NotARealAction", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidAction");
}

#[tokio::test]
async fn duplicate_queue_name_with_different_attributes_conflicts() {
    let router = router();
    call(router.clone(), "CreateQueue", json!({ "QueueName": "q" })).await;

    let (status, body) = call(
        router,
        "CreateQueue",
        json!({ "QueueName": "q", "Attributes": { "DelaySeconds": "5" } }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["__type"], "com.amazonaws.sqs#QueueAlreadyExists");
}

#[tokio::test]
async fn fifo_queue_name_must_end_with_dot_fifo() {
    let router = router();
    let (status, _body) = call(
        router,
        "CreateQueue",
        json!({ "QueueName": "orders", "Attributes": { "FifoQueue": "true" } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
