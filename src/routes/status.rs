use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::orchestrator::AgentState;

pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "Hybrid AI Agent is ready" })),
    )
}

pub async fn health(State(state): State<AgentState>) -> impl IntoResponse {
    let body = json!({
        "status": "ok",
        "active_chains": state.active_chains(),
    });
    (StatusCode::OK, Json(body))
}
