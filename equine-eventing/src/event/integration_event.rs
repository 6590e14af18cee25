use super::{EventPayload, EventStatus};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 集成事件：一次跨模块事实的不可变描述，外加由分发器维护的生命周期字段
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// 事件唯一标识符，未指定时生成 UUID v4
    #[builder(into, default = Uuid::new_v4().to_string())]
    id: String,
    /// 事件类型，订阅与分发均以此为键
    #[builder(into)]
    event_type: String,
    /// 发出事件的模块
    #[builder(into)]
    source_module: String,
    /// 逻辑上的接收模块
    #[builder(into)]
    target_module: String,
    /// 所属租户（可选，仅用于标记与查询）
    #[builder(into)]
    tenant_id: Option<String>,
    payload: EventPayload,
    #[builder(skip)]
    status: EventStatus,
    #[builder(skip)]
    retry_count: u32,
    #[builder(skip)]
    error: Option<String>,
    #[builder(default = Utc::now())]
    created_at: DateTime<Utc>,
    #[builder(skip)]
    processed_at: Option<DateTime<Utc>>,
}

impl IntegrationEvent {
    /// 以负载变体推导事件类型；`Custom` 负载请使用 `builder()` 显式指定类型
    pub fn from_payload(
        source_module: impl Into<String>,
        target_module: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        let event_type = payload.event_type().unwrap_or("custom");

        IntegrationEvent::builder()
            .event_type(event_type)
            .source_module(source_module)
            .target_module(target_module)
            .payload(payload)
            .build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    pub fn target_module(&self) -> &str {
        &self.target_module
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// 事件的来源或目标是否为指定模块
    pub fn touches_module(&self, module_id: &str) -> bool {
        self.source_module == module_id || self.target_module == module_id
    }

    /// 处理耗时（毫秒），仅终态事件有值
    pub fn processing_time_ms(&self) -> Option<i64> {
        self.processed_at
            .map(|at| (at - self.created_at).num_milliseconds())
    }

    pub(crate) fn mark_processing(&mut self) -> bool {
        self.advance(EventStatus::Processing)
    }

    pub(crate) fn mark_completed(&mut self) -> bool {
        if !self.advance(EventStatus::Completed) {
            return false;
        }
        self.processed_at = Some(Utc::now().max(self.created_at));
        true
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if !self.advance(EventStatus::Failed) {
            return false;
        }
        self.error = Some(reason.into());
        self.processed_at = Some(Utc::now().max(self.created_at));
        true
    }

    /// 重试计数只增不减
    pub(crate) fn record_retries(&mut self, retries: u32) {
        self.retry_count = self.retry_count.max(retries);
    }

    fn advance(&mut self, next: EventStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}
