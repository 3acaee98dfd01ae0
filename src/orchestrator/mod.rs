//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责进程级资源和答题链调度，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! routes (入站 HTTP)
//!     ↓
//! orchestrator::AgentState (持有浏览器 / HTTP 客户端，调度链)
//!     ↓
//! workflow::QuizFlow (处理一条链)
//!     ↓
//! services (能力层：fetch / classify / load / answer / chart / submit)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有 BrowserSession
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod agent;

pub use agent::AgentState;
