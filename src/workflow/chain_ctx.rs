//! 答题链上下文
//!
//! 封装"我正在跑哪一条链、用谁的身份提交"这一信息

use std::fmt::Display;

use crate::models::Identity;

/// 答题链上下文
///
/// 每条链独有一份，链之间不共享
#[derive(Debug, Clone)]
pub struct ChainCtx {
    /// 链 ID（仅用于日志和报告）
    pub chain_id: String,

    /// 提交时携带的身份
    pub identity: Identity,
}

impl ChainCtx {
    pub fn new(chain_id: impl Into<String>, identity: Identity) -> Self {
        Self {
            chain_id: chain_id.into(),
            identity,
        }
    }
}

impl Display for ChainCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[链 {}]", self.chain_id)
    }
}
