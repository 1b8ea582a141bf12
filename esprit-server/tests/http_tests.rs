use axum::body::Body;
use axum::http::{Request, StatusCode};
use esprit_fanout::TracerBridge;
use esprit_pricing::PricingDb;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tower::ServiceExt;

fn test_router() -> axum::Router {
    let tracer = Arc::new(Mutex::new(esprit_fanout::TracerState::new()));
    let pricing = Arc::new(PricingDb::new());
    let bridge = TracerBridge::new(tracer, pricing, "anthropic/claude-sonnet-4-5");
    esprit_server::router(bridge)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_router();
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn screenshot_lookup_for_unknown_agent_returns_null() {
    let app = test_router();
    let req = Request::builder()
        .uri("/api/screenshot/agent-does-not-exist")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["screenshot"], serde_json::Value::Null);
    assert_eq!(body["agent_id"], "agent-does-not-exist");
}
