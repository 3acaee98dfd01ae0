//! # Quiz Chain Agent
//!
//! 自动完成链式测验的答题代理：抓取题目页面、识别附带数据、
//! 调用大模型作答、提交答案，并根据返回结果前进、重试或结束。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 浏览器生命周期，进程级共享的 `BrowserSession`
//! - `infrastructure/` - `JsExecutor`，单个 page 的所有者，提供导航 / eval / 截图能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `PageFetcher` - 渲染页面、跳过拦截页
//! - `ResourceClassifier` - 资源分类、提取提交地址
//! - `ResourceLoader` - 下载资源、PDF 转图片
//! - `LlmService` - 文本 / 视觉模型作答
//! - `ChartRenderer` - 图表渲染
//! - `SubmissionClient` - 提交答案
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一条链"的完整处理流程
//! - `ChainCtx` - 上下文封装（chain_id + 身份）
//! - `QuizFlow` - 流程编排（fetch → classify → answer → submit → decide）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - `AgentState`，持有共享资源并调度链
//! - `routes/` - 入站 HTTP 接口
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod constants;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{ChainOutcome, ChainReport, QuizRequest, SubmissionResult};
pub use orchestrator::AgentState;
pub use routes::router;
pub use workflow::{ChainCtx, QuizFlow};
