//! 提交请求与提交结果

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 发送给提交端的 JSON 体
#[derive(Debug, Serialize)]
pub struct SubmissionBody<'a> {
    pub email: &'a str,
    pub secret: &'a str,
    pub url: &'a str,
    pub answer: &'a JsonValue,
}

/// 提交端响应的线上格式
#[derive(Debug, Deserialize)]
struct WireSubmissionResult {
    correct: Option<JsonValue>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// 解析后的提交结果，是流程决策的唯一依据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    pub correct: bool,
    pub next_url: Option<String>,
    pub message: Option<String>,
}

impl SubmissionResult {
    /// 解析提交端返回的 JSON
    ///
    /// `correct` 必须是布尔值；`url` 为空串视为没有下一题；
    /// `reason` 作为 `message` 的别名。
    pub fn parse(body: &str) -> Result<Self, String> {
        let wire: WireSubmissionResult =
            serde_json::from_str(body).map_err(|e| format!("不是合法的 JSON 对象: {e}"))?;

        let correct = match wire.correct {
            Some(JsonValue::Bool(b)) => b,
            Some(other) => return Err(format!("correct 字段不是布尔值: {other}")),
            None => return Err("缺少 correct 字段".to_string()),
        };

        let next_url = wire
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(Self {
            correct,
            next_url,
            message: wire.message.or(wire.reason),
        })
    }
}
