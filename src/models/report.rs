//! 答题链的终止状态与运行报告

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::answer::EngineKind;
use super::page::ResourceKind;

/// 流程中的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStep {
    Fetch,
    Classify,
    Answer,
    Submit,
}

impl std::fmt::Display for ChainStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChainStep::Fetch => "fetch",
            ChainStep::Classify => "classify",
            ChainStep::Answer => "answer",
            ChainStep::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    FetchFailure,
    MissingSubmitUrl,
    ClassificationFailure,
    AnswerEngineFailure,
    ChartRenderFailure,
    SubmissionTransportFailure,
    MalformedResponse,
    PayloadTooLarge,
    DeadlineExceeded,
    Cancelled,
}

/// 答题链的终止状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainOutcome {
    /// 答对且没有下一题
    Success { last_url: String },
    /// 重试次数用完
    Exhausted { url: String, attempts: u32 },
    /// 不可恢复的错误
    Error {
        step: ChainStep,
        kind: FailureKind,
        url: String,
        message: String,
    },
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChainOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChainOutcome::Success { .. } => "TERMINATE-SUCCESS",
            ChainOutcome::Exhausted { .. } => "TERMINATE-EXHAUSTED",
            ChainOutcome::Error { .. } => "TERMINATE-ERROR",
        }
    }
}

/// 一次提交的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    pub task_url: String,
    pub attempt: u32,
    pub resource_kind: ResourceKind,
    pub engine: EngineKind,
    pub correct: bool,
    pub next_url: Option<String>,
    pub message: Option<String>,
}

/// 一个步骤的执行记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub task_url: String,
    pub attempt: u32,
    pub step: ChainStep,
    pub elapsed_ms: u64,
    pub ok: bool,
}

/// 一条答题链的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub chain_id: String,
    pub start_url: String,
    pub outcome: ChainOutcome,
    pub steps: Vec<StepRecord>,
    pub submissions: Vec<SubmissionRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ChainReport {
    /// 链上访问过的题目 URL（按顺序去重相邻项）
    pub fn visited_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        for record in &self.submissions {
            if urls.last() != Some(&record.task_url.as_str()) {
                urls.push(record.task_url.as_str());
            }
        }
        urls
    }
}
