//! 事件总线统一错误定义
//!
//! 覆盖处理器失败、超时、配置校验与序列化等最小必要集合。
//! 处理器自身返回 `anyhow::Result`，由分发器统一转换为 `BusError`。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 分发 ---
    #[error("event handler error: handler={handler}, reason={reason}")]
    HandlerFailed { handler: String, reason: String },
    #[error("event handler timed out: handler={handler}, timeout_ms={timeout_ms}")]
    Timeout { handler: String, timeout_ms: u64 },

    // --- 配置 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl BusError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        BusError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout { .. })
    }
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;
