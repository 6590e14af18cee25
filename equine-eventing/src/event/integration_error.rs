use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    HandlerFailed,
    Timeout,
    /// 无处理器订阅且策略要求判为失败
    Unhandled,
}

/// 集成错误记录：某个事件的处理器耗尽重试后追加
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationError {
    id: String,
    /// 关联事件（仅引用，不拥有）
    event_id: String,
    module_id: String,
    error_type: ErrorKind,
    message: String,
    stack: Option<String>,
    timestamp: DateTime<Utc>,
    resolved: bool,
}

impl IntegrationError {
    pub fn new(
        event_id: impl Into<String>,
        module_id: impl Into<String>,
        error_type: ErrorKind,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            module_id: module_id.into(),
            error_type,
            message: message.into(),
            stack,
            timestamp: Utc::now(),
            resolved: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn error_type(&self) -> ErrorKind {
        self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub(crate) fn resolve(&mut self) {
        self.resolved = true;
    }

    #[cfg(test)]
    pub(crate) fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
