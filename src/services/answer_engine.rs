//! 作答引擎接口
//!
//! 文本模型和视觉模型各一个 trait，流程层只依赖这里的接口。

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{AppResult, LlmError};
use crate::models::{ChartSpec, ModelReply};

/// 交给文本模型的题目
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextQuestion {
    /// 渲染后的页面文本（含题干）
    pub page_text: String,
    /// 下载到的 CSV / JSON / 文本内容
    pub supporting_text: Option<String>,
    /// 上一次提交的纠错信息
    pub feedback: Option<String>,
}

/// 交给视觉模型的题目
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionQuestion {
    pub page_text: String,
    /// `data:` URI 形式的图片（PDF 已转为逐页 PNG）
    pub images: Vec<String>,
    pub feedback: Option<String>,
}

/// 文本推理模型
#[async_trait]
pub trait TextEngine: Send + Sync {
    /// 根据页面文本和附带数据作答
    async fn answer(&self, question: &TextQuestion) -> AppResult<ModelReply>;

    /// 从页面文本中推测主要资源的 URL，找不到时返回 `None`
    async fn locate_resource(&self, page_text: &str) -> AppResult<Option<String>>;
}

/// 视觉模型
#[async_trait]
pub trait VisionEngine: Send + Sync {
    async fn answer(&self, question: &VisionQuestion) -> AppResult<ModelReply>;
}

/// 解析模型回复
///
/// 允许回复被 ```json 代码块包裹或夹带说明文字，
/// 取第一个完整的 JSON 对象。`chart` 优先于 `answer`。
pub fn parse_model_reply(raw: &str) -> Result<ModelReply, LlmError> {
    let value = extract_json_object(raw)?;

    if let Some(chart) = value.get("chart") {
        let spec: ChartSpec =
            serde_json::from_value(chart.clone()).map_err(|e| LlmError::ReplyParseFailed {
                response: raw.to_string(),
                reason: format!("chart 字段格式错误: {e}"),
            })?;
        return Ok(ModelReply::Chart(spec));
    }

    match value.get("answer") {
        Some(JsonValue::Null) | None => Err(LlmError::MissingAnswer {
            response: raw.to_string(),
        }),
        Some(answer) => Ok(ModelReply::Answer(answer.clone())),
    }
}

fn extract_json_object(raw: &str) -> Result<JsonValue, LlmError> {
    let text = strip_code_fence(raw.trim());

    if let Ok(value @ JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(text) {
        return Ok(value);
    }

    // 回复里夹带了说明文字：逐个尝试以 '{' 开头的片段
    for (start, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<JsonValue>();
        if let Some(Ok(value @ JsonValue::Object(_))) = stream.next() {
            return Ok(value);
        }
    }

    Err(LlmError::ReplyParseFailed {
        response: raw.to_string(),
        reason: "回复中没有 JSON 对象".to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // 去掉语言标记所在的第一行
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
