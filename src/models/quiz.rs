//! 答题请求与单题任务

use serde::{Deserialize, Serialize};

/// 入站请求：启动一条答题链
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

impl QuizRequest {
    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// 提交答案时携带的身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub secret: String,
}

/// 单个题目 URL 上的答题任务
///
/// 换到新 URL 时重新创建，`attempt_count` 随之从 1 开始。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizTask {
    pub url: String,
    /// 当前是第几次作答（从 1 开始）
    pub attempt_count: u32,
    /// 上一次提交返回的纠错信息
    pub prior_feedback: Option<String>,
}

impl QuizTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempt_count: 1,
            prior_feedback: None,
        }
    }

    /// 已使用的重试次数
    pub fn retries_used(&self) -> u32 {
        self.attempt_count.saturating_sub(1)
    }

    /// 带着反馈进入下一次作答
    pub fn retry_with(&mut self, feedback: impl Into<String>) {
        self.attempt_count += 1;
        self.prior_feedback = Some(feedback.into());
    }
}
