//! 事件总线配置（BusConfig）
//!
//! 所有字段均带默认值，可直接通过 serde 从 JSON/TOML 等格式反序列化，
//! 缺省字段回落到 `Default`。构造总线前需调用 `validate` 校验取值范围。
//!
use crate::error::{BusError, BusResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 同一事件多个处理器的执行方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 并发执行；优先级只决定分发列表的顺序，不保证完成顺序
    #[default]
    Concurrent,
    /// 按优先级从高到低逐个执行
    Sequential,
}

/// 没有任何处理器订阅时，事件的终态策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledPolicy {
    /// 保持 pending，仅记录告警
    #[default]
    LeavePending,
    /// 直接标记为 completed
    Complete,
    /// 标记为 failed 并写入错误日志
    Fail,
}

/// 事件总线配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 单个处理器的最大尝试次数（含首次）
    pub retry_attempts: u32,
    /// 单次尝试的超时时间（毫秒）
    pub timeout_ms: u64,
    /// 线性退避的基数（毫秒），第 n 次重试前等待 `retry_backoff_ms * n`
    pub retry_backoff_ms: u64,
    /// 是否输出 tracing 日志
    pub enable_logging: bool,
    /// 模块健康判定的失败率阈值
    pub error_threshold: f64,
    /// 模块健康统计窗口（最近 N 条相关事件）
    pub health_window: usize,
    /// 事件/错误日志的环形缓冲容量
    pub max_history: usize,
    /// 单事件的处理并发（同一事件广播给多个 handler）
    pub handler_concurrency: usize,
    pub dispatch_mode: DispatchMode,
    pub unhandled: UnhandledPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            timeout_ms: 30_000,
            retry_backoff_ms: 1_000,
            enable_logging: true,
            error_threshold: 0.1,
            health_window: 10,
            max_history: 10_000,
            handler_concurrency: 8,
            dispatch_mode: DispatchMode::Concurrent,
            unhandled: UnhandledPolicy::LeavePending,
        }
    }
}

impl BusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 第 `retry` 次重试前的等待时间（从 1 开始计数）
    pub fn backoff_for(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(retry)))
    }

    /// 从 JSON 文本解析配置，缺省字段使用默认值
    pub fn from_json(raw: &str) -> BusResult<Self> {
        let config: BusConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BusResult<()> {
        if self.retry_attempts == 0 {
            return Err(BusError::invalid_config("retry_attempts must be at least 1"));
        }
        if self.handler_concurrency == 0 {
            return Err(BusError::invalid_config(
                "handler_concurrency must be at least 1",
            ));
        }
        if self.health_window == 0 {
            return Err(BusError::invalid_config("health_window must be at least 1"));
        }
        if self.max_history == 0 {
            return Err(BusError::invalid_config("max_history must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(BusError::invalid_config(format!(
                "error_threshold must be within 0.0..=1.0, got {}",
                self.error_threshold
            )));
        }
        Ok(())
    }
}
