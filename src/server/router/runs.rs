use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::orchestrator::RunRequest;
use crate::server::state::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new()
        .route("/run", post(start_run))
        .route("/runs", get(list_runs))
        .route("/runs/:run_id", get(get_run))
}

/// Accepts the run and answers immediately; progress flows over the run's
/// event room, never this response.
async fn start_run(
    State(state): State<ServeState>,
    Json(request): Json<RunRequest>,
) -> impl IntoResponse {
    let run_id = state.coordinator.accept(request);
    Json(json!({"ok": true, "runId": run_id}))
}

async fn list_runs(State(state): State<ServeState>) -> impl IntoResponse {
    Json(json!({"ok": true, "runs": state.registry.list()}))
}

async fn get_run(
    State(state): State<ServeState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&run_id) {
        Some(snapshot) => Json(json!({"ok": true, "run": snapshot})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "unknown run"})),
        )
            .into_response(),
    }
}
