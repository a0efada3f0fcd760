//! HTTP route tests driven through `tower::ServiceExt::oneshot`

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use objwatch_server::api::{create_router, AppState};
use objwatch_server::db::InMemoryObjectStore;
use objwatch_server::pipeline::{Pipeline, Supervisor};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

mod common;
use common::{test_pipeline_config, wait_until, Behavior, ScriptedFetcher};

struct TestApp {
    router: Router,
    pipeline: Pipeline,
    store: Arc<InMemoryObjectStore>,
}

fn test_app(fetcher: ScriptedFetcher) -> TestApp {
    let store = Arc::new(InMemoryObjectStore::new());
    let pipeline = Pipeline::start(
        &test_pipeline_config(),
        Arc::new(fetcher),
        store.clone(),
        Supervisor::new(),
    );
    let router = create_router(AppState::from_pipeline(&pipeline));
    TestApp {
        router,
        pipeline,
        store,
    }
}

fn callback(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/callback")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_callback_accepts_batch() {
    let app = test_app(ScriptedFetcher::new().with(2, Behavior::Offline));

    let (status, body) = send(&app.router, callback(r#"{"object_ids":[1,2,2]}"#)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["received"], 3);
    assert_eq!(body["data"]["admitted"], 2);
    assert_eq!(body["data"]["duplicates"], 1);

    assert!(wait_until(Duration::from_secs(2), || app.store.len() == 1).await);
    app.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_malformed_callback_is_rejected() {
    let app = test_app(ScriptedFetcher::new());

    for body in ["", "not json", r#"{"object_ids":"1,2"}"#, r#"{"ids":[1]}"#, r#"[1,2]"#] {
        let (status, json) = send(&app.router, callback(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(json["error"]["message"], "error decoding request");
    }

    let report = app.pipeline.shutdown().await;
    assert_eq!(report.stats.received, 0);
}

#[tokio::test]
async fn test_callback_during_shutdown_is_unavailable() {
    let app = test_app(ScriptedFetcher::new());
    app.pipeline.supervisor().request_shutdown();

    let (status, _) = send(&app.router, callback(r#"{"object_ids":[1]}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_health_and_stats() {
    let app = test_app(ScriptedFetcher::new());

    let (status, body) = send(&app.router, request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    send(&app.router, callback(r#"{"object_ids":[10,11]}"#)).await;
    assert!(wait_until(Duration::from_secs(2), || app.store.len() == 2).await);

    let (status, body) = send(&app.router, request("GET", "/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["admitted"], 2);
    assert_eq!(body["data"]["online"], 2);
    assert_eq!(body["data"]["tracked_identifiers"], 2);

    let (status, body) = send(&app.router, request("GET", "/objects")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![10, 11]);

    app.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_identifiers_can_be_released() {
    let app = test_app(ScriptedFetcher::new());

    send(&app.router, callback(r#"{"object_ids":[1,2,3]}"#)).await;

    let (status, _) = send(&app.router, request("DELETE", "/identifiers/2")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, request("DELETE", "/identifiers/2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, request("DELETE", "/identifiers/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Released id is admitted again
    let (_, body) = send(&app.router, callback(r#"{"object_ids":[2,3]}"#)).await;
    assert_eq!(body["data"]["admitted"], 1);
    assert_eq!(body["data"]["duplicates"], 1);

    let (status, body) = send(&app.router, request("DELETE", "/identifiers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 3);
    assert!(app.pipeline.identifiers().is_empty());

    app.pipeline.shutdown().await;
}
