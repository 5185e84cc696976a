use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

mod runs;
mod ws;

use super::state::ServeState;

pub(crate) fn build_router() -> Router<ServeState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/livez", get(live_handler))
        .route("/readyz", get(ready_handler))
        .merge(runs::router())
        .merge(ws::router())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let health = state.health.snapshot();
    Json(json!({
        "live": health.live,
        "ready": health.ready,
    }))
}

async fn live_handler(State(state): State<ServeState>) -> impl IntoResponse {
    if state.health.snapshot().live {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "down")
    }
}

async fn ready_handler(State(state): State<ServeState>) -> impl IntoResponse {
    if state.health.snapshot().ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
