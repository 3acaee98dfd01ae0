//! `POST /quiz`：校验身份后启动一条答题链

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::models::QuizRequest;
use crate::orchestrator::AgentState;

#[derive(Debug, Default, Deserialize)]
pub struct QuizQuery {
    /// 为 true 时同步跑完整条链并返回报告
    #[serde(default)]
    pub wait: bool,
}

pub async fn start_quiz(
    State(state): State<AgentState>,
    Query(query): Query<QuizQuery>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return reject(rejection),
    };

    if !state.verify_secret(&request.secret) {
        warn!("拒绝请求: secret 不匹配 ({})", request.email);
        return detail(StatusCode::FORBIDDEN, "Unauthorized: Invalid secret key");
    }

    let url_ok = Url::parse(&request.url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !url_ok {
        return detail(StatusCode::BAD_REQUEST, "Invalid url: expected an http(s) address");
    }

    if query.wait {
        info!("📥 收到同步答题请求: {}", request.url);
        let report = state.run_chain(request).await;
        return (StatusCode::OK, Json(report)).into_response();
    }

    info!("📥 收到答题请求: {}", request.url);
    let chain_id = state.spawn_chain(request);
    (
        StatusCode::OK,
        Json(json!({
            "message": "Agent started in background",
            "chain_id": chain_id,
        })),
    )
        .into_response()
}

/// 请求体过大保留 413，其余解析问题统一为 400
fn reject(rejection: JsonRejection) -> Response {
    let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    };
    warn!("拒绝请求 ({}): {}", status, rejection.body_text());
    detail(status, &rejection.body_text())
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}
