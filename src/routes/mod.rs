//! 入站 HTTP 路由

pub mod quiz;
pub mod status;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::orchestrator::AgentState;

/// 组装全部路由，入站 JSON 大小上限取自配置
pub fn router(state: AgentState) -> Router {
    let body_limit = state.config().max_payload_bytes;

    Router::new()
        .route("/", get(status::root))
        .route("/health", get(status::health))
        .route("/quiz", post(quiz::start_quiz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
