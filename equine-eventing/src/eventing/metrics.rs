//! 派生指标（BusMetrics）
//!
//! 基于保留的全部事件历史计算成功/失败计数、平均处理耗时、整体错误率，
//! 以及按模块最近 N 条事件的失败率得出的健康等级。
//!
use crate::event::{EventStatus, IntegrationEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleHealth {
    Healthy,
    Warning,
    Error,
}

impl ModuleHealth {
    /// 失败率超过阈值为 error，超过阈值一半为 warning
    pub fn classify(failure_rate: f64, threshold: f64) -> Self {
        if failure_rate > threshold {
            ModuleHealth::Error
        } else if failure_rate > threshold / 2.0 {
            ModuleHealth::Warning
        } else {
            ModuleHealth::Healthy
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusMetrics {
    pub total_events: usize,
    pub successful_events: usize,
    pub failed_events: usize,
    /// 平均处理耗时（毫秒），仅统计已到达终态的事件
    pub average_processing_time_ms: f64,
    pub error_rate: f64,
    pub module_status: BTreeMap<String, ModuleHealth>,
}

pub(crate) fn compute<'a, I>(events: I, health_window: usize, error_threshold: f64) -> BusMetrics
where
    I: IntoIterator<Item = &'a IntegrationEvent>,
{
    let mut ordered: Vec<&IntegrationEvent> = events.into_iter().collect();
    ordered.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

    let total_events = ordered.len();
    let successful_events = count_status(&ordered, EventStatus::Completed);
    let failed_events = count_status(&ordered, EventStatus::Failed);

    let durations: Vec<i64> = ordered
        .iter()
        .filter_map(|e| e.processing_time_ms())
        .collect();
    let average_processing_time_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };

    let error_rate = if total_events == 0 {
        0.0
    } else {
        failed_events as f64 / total_events as f64
    };

    // 模块 -> (窗口内事件数, 窗口内失败数)
    let mut windows: HashMap<&str, (usize, usize)> = HashMap::new();
    for event in &ordered {
        let failed = event.status() == EventStatus::Failed;
        let mut modules = vec![event.source_module()];
        if event.target_module() != event.source_module() {
            modules.push(event.target_module());
        }

        for module in modules {
            let slot = windows.entry(module).or_default();
            if slot.0 < health_window {
                slot.0 += 1;
                slot.1 += usize::from(failed);
            }
        }
    }

    let module_status = windows
        .into_iter()
        .map(|(module, (seen, failed))| {
            let rate = failed as f64 / seen as f64;
            (module.to_string(), ModuleHealth::classify(rate, error_threshold))
        })
        .collect();

    BusMetrics {
        total_events,
        successful_events,
        failed_events,
        average_processing_time_ms,
        error_rate,
        module_status,
    }
}

fn count_status(events: &[&IntegrationEvent], status: EventStatus) -> usize {
    events.iter().filter(|e| e.status() == status).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn event(
        source: &str,
        target: &str,
        minutes_ago: i64,
        failed: Option<bool>,
    ) -> IntegrationEvent {
        let mut ev = IntegrationEvent::builder()
            .event_type("test")
            .source_module(source)
            .target_module(target)
            .payload(json!({}).into())
            .created_at(Utc::now() - Duration::minutes(minutes_ago))
            .build();
        match failed {
            Some(true) => {
                ev.mark_processing();
                ev.mark_failed("boom");
            }
            Some(false) => {
                ev.mark_processing();
                ev.mark_completed();
            }
            None => {}
        }
        ev
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(ModuleHealth::classify(0.0, 0.1), ModuleHealth::Healthy);
        assert_eq!(ModuleHealth::classify(0.05, 0.1), ModuleHealth::Healthy);
        assert_eq!(ModuleHealth::classify(0.06, 0.1), ModuleHealth::Warning);
        assert_eq!(ModuleHealth::classify(0.1, 0.1), ModuleHealth::Warning);
        assert_eq!(ModuleHealth::classify(0.11, 0.1), ModuleHealth::Error);
    }

    #[test]
    fn empty_history_has_zero_rates() {
        let m = compute(std::iter::empty(), 10, 0.1);
        assert_eq!(m.total_events, 0);
        assert_eq!(m.error_rate, 0.0);
        assert_eq!(m.average_processing_time_ms, 0.0);
        assert!(m.module_status.is_empty());
    }

    #[test]
    fn counts_and_error_rate() {
        let events = vec![
            event("breeding", "clinic", 3, Some(false)),
            event("breeding", "clinic", 2, Some(true)),
            event("pharmacy", "finance", 1, Some(false)),
            event("lab", "clinic", 0, None),
        ];
        let m = compute(&events, 10, 0.1);

        assert_eq!(m.total_events, 4);
        assert_eq!(m.successful_events, 2);
        assert_eq!(m.failed_events, 1);
        assert_eq!(m.error_rate, 0.25);
        assert!(m.average_processing_time_ms >= 0.0);
        assert_eq!(m.module_status["breeding"], ModuleHealth::Error);
        assert_eq!(m.module_status["pharmacy"], ModuleHealth::Healthy);
        assert_eq!(m.module_status["lab"], ModuleHealth::Healthy);
    }

    #[test]
    fn health_only_looks_at_most_recent_window() {
        // 早期失败落在窗口之外
        let mut events = vec![event("stable", "finance", 100, Some(true))];
        for i in 0..10 {
            events.push(event("stable", "finance", 50 - i, Some(false)));
        }
        let m = compute(&events, 10, 0.1);
        assert_eq!(m.module_status["stable"], ModuleHealth::Healthy);

        let m = compute(&events, 11, 0.1);
        // 1/11 ≈ 0.09 > 0.05
        assert_eq!(m.module_status["stable"], ModuleHealth::Warning);
    }
}
