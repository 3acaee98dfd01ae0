//! 答案提交服务 - 业务能力层
//!
//! 序列化答案、检查大小上限、POST 到提交地址并解析结果。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use crate::error::{ApiError, AppError, AppResult};
use crate::models::{AnswerPayload, Identity, SubmissionBody, SubmissionResult};
use crate::utils::logging::truncate_text;

/// 答案提交能力
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// 提交一次答案
    ///
    /// `task_url` 是当前题目的地址，会作为 `url` 字段发送。
    async fn submit(
        &self,
        endpoint: &str,
        payload: &AnswerPayload,
        identity: &Identity,
        task_url: &str,
    ) -> AppResult<SubmissionResult>;
}

/// 序列化提交体，超过上限时返回 `PayloadTooLarge`，不截断
pub fn encode_submission(
    payload: &AnswerPayload,
    identity: &Identity,
    task_url: &str,
    max_bytes: usize,
) -> AppResult<Vec<u8>> {
    let body = SubmissionBody {
        email: &identity.email,
        secret: &identity.secret,
        url: task_url,
        answer: &payload.answer,
    };
    let encoded = serde_json::to_vec(&body)?;

    if encoded.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge {
            size: encoded.len(),
            limit: max_bytes,
        }
        .into());
    }
    Ok(encoded)
}

/// 基于 reqwest 的提交客户端
pub struct HttpSubmissionClient {
    client: reqwest::Client,
    timeout: Duration,
    max_payload_bytes: usize,
}

impl HttpSubmissionClient {
    pub fn new(client: reqwest::Client, timeout: Duration, max_payload_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_payload_bytes,
        }
    }
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
    async fn submit(
        &self,
        endpoint: &str,
        payload: &AnswerPayload,
        identity: &Identity,
        task_url: &str,
    ) -> AppResult<SubmissionResult> {
        let body = encode_submission(payload, identity, task_url, self.max_payload_bytes)
            .inspect_err(|e| warn!("提交体未发送: {}", e))?;

        debug!(
            "提交答案到 {}: {}",
            endpoint,
            truncate_text(&payload.answer.to_string(), 120)
        );

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::from(ApiError::Timeout {
                        endpoint: endpoint.to_string(),
                        secs: self.timeout.as_secs(),
                    })
                } else {
                    AppError::api_request_failed(endpoint, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let result = SubmissionResult::parse(&text)
            .map_err(|reason| AppError::malformed_response(endpoint, reason))?;

        info!(
            "📨 提交结果: correct={}, next_url={}, message={}",
            result.correct,
            result.next_url.as_deref().unwrap_or("-"),
            result.message.as_deref().unwrap_or("-")
        );
        Ok(result)
    }
}
