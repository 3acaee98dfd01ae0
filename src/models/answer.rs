//! 答案载荷

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::chart::ChartSpec;
use super::page::ResourceKind;

/// 作答时使用的模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Text,
    Vision,
}

/// 答案附带的元信息，不会发送给提交端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub engine: EngineKind,
    pub resource_kind: ResourceKind,
    pub chart_rendered: bool,
}

/// 每次作答产生一次，原样交给提交客户端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnswerMetadata>,
}

impl AnswerPayload {
    pub fn new(answer: JsonValue) -> Self {
        Self {
            answer,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: AnswerMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 模型回复：直接给出答案，或要求先画图
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Answer(JsonValue),
    Chart(ChartSpec),
}
