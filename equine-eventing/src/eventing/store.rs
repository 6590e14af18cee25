//! 可观测存储（EventStore）
//!
//! 追加式的事件历史与错误日志，均为固定容量的环形缓冲，满时淘汰最旧条目。
//! 锁只在同步代码中短暂持有，不跨越 `.await`。
//!
use super::metrics::{self, BusMetrics};
use crate::event::{EventStatus, IntegrationError, IntegrationEvent};
use bon::Builder;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 事件查询条件
#[derive(Builder, Clone, Debug, Default)]
pub struct EventFilter {
    /// 匹配来源或目标模块
    #[builder(into)]
    pub module_id: Option<String>,
    pub status: Option<EventStatus>,
    #[builder(into)]
    pub tenant_id: Option<String>,
    /// 只返回最新的 N 条
    pub limit: Option<usize>,
}

impl EventFilter {
    fn matches(&self, event: &IntegrationEvent) -> bool {
        if let Some(module_id) = self.module_id.as_deref() {
            if !event.touches_module(module_id) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if event.status() != status {
                return false;
            }
        }
        if let Some(tenant_id) = self.tenant_id.as_deref() {
            if event.tenant_id() != Some(tenant_id) {
                return false;
            }
        }
        true
    }
}

/// 一次清理的结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub events_removed: usize,
    pub errors_removed: usize,
}

#[derive(Default)]
struct Logs {
    events: VecDeque<IntegrationEvent>,
    errors: VecDeque<IntegrationError>,
}

pub struct EventStore {
    logs: RwLock<Logs>,
    capacity: usize,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: RwLock::new(Logs::default()),
            capacity: capacity.max(1),
        }
    }

    /// 追加事件；返回因容量被淘汰的条数
    pub fn record(&self, event: IntegrationEvent) -> usize {
        let mut logs = self.logs.write();
        logs.events.push_back(event);
        let mut evicted = 0;
        while logs.events.len() > self.capacity {
            logs.events.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// 用最新快照覆盖同 id 的历史记录（从最新一端查找）；已被淘汰时忽略
    pub fn update(&self, event: &IntegrationEvent) -> bool {
        let mut logs = self.logs.write();
        match logs.events.iter_mut().rev().find(|e| e.id() == event.id()) {
            Some(slot) => {
                *slot = event.clone();
                true
            }
            None => false,
        }
    }

    pub fn append_error(&self, error: IntegrationError) {
        let mut logs = self.logs.write();
        logs.errors.push_back(error);
        while logs.errors.len() > self.capacity {
            logs.errors.pop_front();
        }
    }

    pub fn event(&self, id: &str) -> Option<IntegrationEvent> {
        let logs = self.logs.read();
        logs.events.iter().rev().find(|e| e.id() == id).cloned()
    }

    /// 按条件过滤，按 `created_at` 从新到旧排序后截断
    pub fn events(&self, filter: &EventFilter) -> Vec<IntegrationEvent> {
        let mut out: Vec<IntegrationEvent> = {
            let logs = self.logs.read();
            logs.events
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        };
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }

    pub fn errors(&self, resolved: Option<bool>) -> Vec<IntegrationError> {
        let mut out: Vec<IntegrationError> = {
            let logs = self.logs.read();
            logs.errors
                .iter()
                .filter(|e| resolved.is_none_or(|r| e.is_resolved() == r))
                .cloned()
                .collect()
        };
        out.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        out
    }

    pub fn resolve_error(&self, error_id: &str) -> bool {
        let mut logs = self.logs.write();
        match logs.errors.iter_mut().find(|e| e.id() == error_id) {
            Some(error) => {
                error.resolve();
                true
            }
            None => false,
        }
    }

    pub fn metrics(&self, health_window: usize, error_threshold: f64) -> BusMetrics {
        let logs = self.logs.read();
        metrics::compute(logs.events.iter(), health_window, error_threshold)
    }

    /// 删除早于 `cutoff` 的事件与错误（严格小于），其余保持不变
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> CleanupReport {
        let mut logs = self.logs.write();

        let events_before = logs.events.len();
        logs.events.retain(|e| e.created_at() >= cutoff);
        let errors_before = logs.errors.len();
        logs.errors.retain(|e| e.timestamp() >= cutoff);

        CleanupReport {
            events_removed: events_before - logs.events.len(),
            errors_removed: errors_before - logs.errors.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.logs.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorKind;
    use chrono::Duration;
    use serde_json::json;

    fn event_at(id: &str, module: &str, minutes_ago: i64) -> IntegrationEvent {
        IntegrationEvent::builder()
            .id(id)
            .event_type("test")
            .source_module(module)
            .target_module("clinic")
            .payload(json!({ "id": id }).into())
            .created_at(Utc::now() - Duration::minutes(minutes_ago))
            .build()
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let store = EventStore::new(2);
        assert_eq!(store.record(event_at("e1", "breeding", 3)), 0);
        assert_eq!(store.record(event_at("e2", "breeding", 2)), 0);
        assert_eq!(store.record(event_at("e3", "breeding", 1)), 1);

        assert_eq!(store.len(), 2);
        assert!(store.event("e1").is_none());
        assert!(store.event("e3").is_some());
    }

    #[test]
    fn filter_by_module_status_and_limit() {
        let store = EventStore::new(16);
        store.record(event_at("old", "breeding", 30));
        store.record(event_at("mid", "pharmacy", 20));
        store.record(event_at("new", "breeding", 10));

        let by_module = store.events(&EventFilter::builder().module_id("breeding").build());
        let ids: Vec<&str> = by_module.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        // target 模块同样匹配
        assert_eq!(
            store
                .events(&EventFilter::builder().module_id("clinic").build())
                .len(),
            3
        );

        let latest = store.events(&EventFilter::builder().limit(1).build());
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id(), "new");

        let failed = store.events(
            &EventFilter::builder()
                .status(EventStatus::Failed)
                .build(),
        );
        assert!(failed.is_empty());
    }

    #[test]
    fn update_overwrites_snapshot() {
        let store = EventStore::new(4);
        let mut ev = event_at("e1", "lab", 1);
        store.record(ev.clone());

        ev.mark_processing();
        ev.mark_completed();
        assert!(store.update(&ev));
        assert_eq!(store.event("e1").unwrap().status(), EventStatus::Completed);

        assert!(!store.update(&event_at("missing", "lab", 1)));
    }

    #[test]
    fn errors_filter_and_resolve() {
        let store = EventStore::new(4);
        let older = IntegrationError::new("e1", "clinic", ErrorKind::HandlerFailed, "a", None)
            .with_timestamp(Utc::now() - Duration::minutes(5));
        let newer = IntegrationError::new("e2", "clinic", ErrorKind::Timeout, "b", None);
        let older_id = older.id().to_string();
        store.append_error(older);
        store.append_error(newer);

        let all = store.errors(None);
        assert_eq!(all[0].event_id(), "e2");
        assert_eq!(all[1].event_id(), "e1");

        assert!(store.resolve_error(&older_id));
        assert!(!store.resolve_error("nope"));
        assert_eq!(store.errors(Some(true)).len(), 1);
        assert_eq!(store.errors(Some(false))[0].event_id(), "e2");
    }

    #[test]
    fn prune_is_strict_on_cutoff() {
        let store = EventStore::new(8);
        let cutoff = Utc::now() - Duration::days(30);
        store.record(
            IntegrationEvent::builder()
                .id("exact")
                .event_type("t")
                .source_module("s")
                .target_module("t")
                .payload(json!(null).into())
                .created_at(cutoff)
                .build(),
        );
        store.record(event_at("ancient", "s", 60 * 24 * 31));
        store.record(event_at("fresh", "s", 1));
        store.append_error(
            IntegrationError::new("ancient", "s", ErrorKind::HandlerFailed, "x", None)
                .with_timestamp(cutoff - Duration::seconds(1)),
        );

        let report = store.prune_before(cutoff);
        assert_eq!(
            report,
            CleanupReport {
                events_removed: 1,
                errors_removed: 1
            }
        );
        assert!(store.event("exact").is_some());
        assert!(store.event("fresh").is_some());
        assert!(store.errors(None).is_empty());
    }
}
