pub mod chain_ctx;
pub mod quiz_flow;

pub use chain_ctx::ChainCtx;
pub use quiz_flow::{decide, Decision, FlowDeps, FlowSettings, QuizFlow, DEFAULT_FEEDBACK};
