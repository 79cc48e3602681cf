//! Router tests covering authentication and request validation.
//!
//! None of these paths reach Redis: the pool is lazy and every asserted
//! response is produced before a broker call would happen.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use relayq_rest::{create_router, AppState};
use relayq_engine::{Broker, CronRegistrar, QueueEngine, ResultStore};
use std::sync::Arc;
use tower::ServiceExt;

fn test_router(api_key: &str) -> Router {
    let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:1")
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap();
    let broker = Broker::new(pool);
    let engine = Arc::new(QueueEngine::new(broker.clone()));
    let cron = Arc::new(CronRegistrar::new(engine.clone()));
    let results = Arc::new(ResultStore::new(broker));

    create_router(AppState::new(engine, cron, results, api_key.to_string()))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn enqueue_without_key_is_unauthorized() {
    let router = test_router("secret-key");
    let response = router.oneshot(post("/enqueue", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enqueue_with_wrong_key_is_unauthorized() {
    let router = test_router("secret-key");
    let mut request = post("/enqueue", "");
    request
        .headers_mut()
        .insert("X-API-Key", "wrong-key".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enqueue_with_correct_key_and_empty_body_is_bad_request() {
    let router = test_router("secret-key");
    let mut request = post("/enqueue", "");
    request
        .headers_mut()
        .insert("X-API-Key", "secret-key".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn auth_disabled_empty_body_is_bad_request_not_unauthorized() {
    let router = test_router("");
    let response = router.oneshot(post("/enqueue", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enqueue_rejects_non_post() {
    let router = test_router("");
    let request = Request::builder()
        .method("GET")
        .uri("/enqueue")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn preflight_passes_without_key() {
    let router = test_router("secret-key");
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/enqueue")
        .header("origin", "http://dashboard.local")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn result_without_id_is_bad_request() {
    let router = test_router("");
    let request = Request::builder()
        .method("GET")
        .uri("/result")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tasks_without_queue_is_bad_request() {
    let router = test_router("");
    let request = Request::builder()
        .method("GET")
        .uri("/tasks")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn schedule_with_invalid_spec_is_bad_request() {
    let router = test_router("");
    let body = r#"{"spec": "not a cron line", "type": "report", "payload": {}}"#;
    let response = router.oneshot(post("/schedule", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("Invalid cron spec:"));
}

#[tokio::test]
async fn schedule_with_valid_spec_registers_entry() {
    let router = test_router("");
    let body = r#"{"spec": "@every 1m", "type": "report", "payload": {"period": "daily"}}"#;
    let response = router.oneshot(post("/schedule", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text, "Job scheduled with EntryID: 1\n");
}

#[tokio::test]
async fn enqueue_with_malformed_json_is_bad_request() {
    let router = test_router("");
    let response = router
        .oneshot(post("/enqueue", "{\"type\": \"email\""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
