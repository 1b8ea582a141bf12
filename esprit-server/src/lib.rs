//! HTTP/WebSocket front door for the live telemetry fan-out: a `/ws`
//! endpoint that streams `full_state`/`delta_batch`/`heartbeat` frames to
//! dashboard clients, a REST screenshot lookup, and a liveness probe.

mod state;
mod subscriber;
mod ws;

pub use state::AppState;
pub use subscriber::WsSubscriber;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use esprit_fanout::TracerBridge;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Assembles the router. Callers own binding the listener and calling
/// `axum::serve`; this only wires routes and shared state so tests can
/// exercise it with `tower::ServiceExt::oneshot` without a real socket.
pub fn router(bridge: Arc<TracerBridge>) -> Router {
    let state = Arc::new(AppState::new(bridge));

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/screenshot/{agent_id}", get(screenshot))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ScreenshotResponse {
    screenshot: Option<String>,
    url: String,
    agent_id: String,
}

async fn screenshot(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    axum::extract::Path(agent_id): axum::extract::Path<String>,
) -> Json<ScreenshotResponse> {
    let (screenshot, url) = state.bridge.get_screenshot(&agent_id);
    Json(ScreenshotResponse { screenshot, url, agent_id })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn healthz() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}
