//! 集成事件总线（IntegrationBus）
//!
//! 进程内发布/订阅：
//! - `subscribe`/`unsubscribe`：按事件类型维护按优先级排序的处理器；
//! - `emit`：记录事件并分发给全部处理器，每个处理器独立超时与线性退避重试；
//! - 查询：事件历史、错误日志、派生指标；
//! - 清理：按时间裁剪历史。
//!
//! 总线不是全局单例，应在进程启动时构造一次，以 `Arc<IntegrationBus>` 显式传给各模块。
//!
use super::metrics::BusMetrics;
use super::registry::HandlerRegistry;
use super::store::{CleanupReport, EventFilter, EventStore};
use super::EventHandler;
use crate::config::{BusConfig, DispatchMode, UnhandledPolicy};
use crate::error::{BusError, BusResult};
use crate::event::{ErrorKind, EventStatus, IntegrationError, IntegrationEvent};
use chrono::Utc;
use futures_util::{StreamExt, stream};
use std::sync::Arc;

/// 默认保留天数
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

macro_rules! bus_log {
    ($enabled:expr, $level:ident, $($arg:tt)+) => {
        if $enabled {
            tracing::$level!($($arg)+);
        }
    };
}

pub struct IntegrationBus {
    config: BusConfig,
    registry: HandlerRegistry,
    store: EventStore,
}

/// 单个处理器在一次分发中的结果
struct HandlerOutcome {
    retries: u32,
    failure: Option<HandlerFailure>,
}

struct HandlerFailure {
    error: BusError,
    stack: Option<String>,
}

impl Default for IntegrationBus {
    fn default() -> Self {
        Self::with_valid_config(BusConfig::default())
    }
}

impl IntegrationBus {
    pub fn new(config: BusConfig) -> BusResult<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: BusConfig) -> Self {
        Self {
            store: EventStore::new(config.max_history),
            registry: HandlerRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    // ---- 订阅 ----

    pub fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        bus_log!(
            self.config.enable_logging,
            debug,
            event_type,
            handler = handler.handler_name(),
            priority = handler.priority(),
            "handler subscribed"
        );
        self.registry.subscribe(event_type, handler);
    }

    pub fn unsubscribe(&self, event_type: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let removed = self.registry.unsubscribe(event_type, handler);
        bus_log!(
            self.config.enable_logging,
            debug,
            event_type,
            handler = handler.handler_name(),
            removed,
            "handler unsubscribed"
        );
        removed
    }

    // ---- 分发 ----

    /// 发布事件并等待全部处理器结束，返回事件的最终快照
    ///
    /// 处理器失败不会以错误形式返回：最终状态与错误记录需通过返回值、
    /// `get_events` 或 `get_errors` 查看。
    pub async fn emit(&self, mut event: IntegrationEvent) -> IntegrationEvent {
        let logging = self.config.enable_logging;

        if event.status() != EventStatus::Pending {
            bus_log!(
                logging,
                warn,
                event_id = event.id(),
                status = %event.status(),
                "only pending events can be emitted; ignoring"
            );
            return event;
        }

        let evicted = self.store.record(event.clone());
        if evicted > 0 {
            bus_log!(logging, debug, evicted, "event history at capacity, oldest entries evicted");
        }

        let handlers = self.registry.matching(event.event_type());
        if handlers.is_empty() {
            bus_log!(
                logging,
                warn,
                event_id = event.id(),
                event_type = event.event_type(),
                "no handlers registered for event type"
            );
            return self.settle_unhandled(event);
        }

        event.mark_processing();
        self.store.update(&event);
        bus_log!(
            logging,
            debug,
            event_id = event.id(),
            event_type = event.event_type(),
            source = event.source_module(),
            target = event.target_module(),
            handlers = handlers.len(),
            "dispatching event"
        );

        let outcomes = self.dispatch(&handlers, &event).await;

        let retries = outcomes.iter().map(|o| o.retries).max().unwrap_or(0);
        event.record_retries(retries);

        // 取优先级最高的失败作为事件错误
        let failure = outcomes.into_iter().find_map(|o| o.failure);
        match failure {
            None => {
                event.mark_completed();
                bus_log!(
                    logging,
                    info,
                    event_id = event.id(),
                    event_type = event.event_type(),
                    retries,
                    "event completed"
                );
            }
            Some(HandlerFailure { error, stack }) => {
                event.mark_failed(error.to_string());
                let kind = if error.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::HandlerFailed
                };
                self.store.append_error(IntegrationError::new(
                    event.id(),
                    event.target_module(),
                    kind,
                    error.to_string(),
                    stack,
                ));
                bus_log!(
                    logging,
                    error,
                    event_id = event.id(),
                    event_type = event.event_type(),
                    retries,
                    error = %error,
                    "event failed"
                );
            }
        }

        self.store.update(&event);
        event
    }

    fn settle_unhandled(&self, mut event: IntegrationEvent) -> IntegrationEvent {
        match self.config.unhandled {
            UnhandledPolicy::LeavePending => return event,
            UnhandledPolicy::Complete => {
                event.mark_completed();
            }
            UnhandledPolicy::Fail => {
                let reason = format!("no handler registered for {}", event.event_type());
                event.mark_failed(reason.clone());
                self.store.append_error(IntegrationError::new(
                    event.id(),
                    event.target_module(),
                    ErrorKind::Unhandled,
                    reason,
                    None,
                ));
            }
        }
        self.store.update(&event);
        event
    }

    /// 结果顺序与分发列表（优先级降序）一致
    ///
    /// 并发模式下 `handler_concurrency` 只限制同时在途的处理器数量，
    /// 先结束的处理器立即让出名额，不必等待排在前面的慢处理器。
    async fn dispatch(
        &self,
        handlers: &[Arc<dyn EventHandler>],
        event: &IntegrationEvent,
    ) -> Vec<HandlerOutcome> {
        match self.config.dispatch_mode {
            DispatchMode::Concurrent => {
                let futures: Vec<_> = handlers
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(move |(idx, handler)| async move {
                        (idx, self.run_with_retry(&handler, event).await)
                    })
                    .collect();
                let mut outcomes: Vec<(usize, HandlerOutcome)> = stream::iter(futures)
                    .buffer_unordered(self.config.handler_concurrency)
                    .collect()
                    .await;
                outcomes.sort_by_key(|(idx, _)| *idx);
                outcomes.into_iter().map(|(_, outcome)| outcome).collect()
            }
            DispatchMode::Sequential => {
                let mut outcomes = Vec::with_capacity(handlers.len());
                for h in handlers {
                    outcomes.push(self.run_with_retry(h, event).await);
                }
                outcomes
            }
        }
    }

    /// 同一处理器最多尝试 `retry_attempts` 次，第 n 次重试前等待 `retry_backoff_ms * n`
    async fn run_with_retry(
        &self,
        handler: &Arc<dyn EventHandler>,
        event: &IntegrationEvent,
    ) -> HandlerOutcome {
        let logging = self.config.enable_logging;
        let max_attempts = self.config.retry_attempts.max(1);
        let mut retries = 0;

        loop {
            let failure = match self.attempt(handler, event).await {
                Ok(()) => {
                    return HandlerOutcome {
                        retries,
                        failure: None,
                    };
                }
                Err(failure) => failure,
            };

            if retries + 1 >= max_attempts {
                bus_log!(
                    logging,
                    error,
                    event_id = event.id(),
                    handler = handler.handler_name(),
                    attempts = retries + 1,
                    error = %failure.error,
                    "handler exhausted retries"
                );
                return HandlerOutcome {
                    retries,
                    failure: Some(failure),
                };
            }

            retries += 1;
            let delay = self.config.backoff_for(retries);
            bus_log!(
                logging,
                warn,
                event_id = event.id(),
                handler = handler.handler_name(),
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %failure.error,
                "handler failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 单次尝试：处理器在独立任务中运行，超时只结束等待，不中止处理器本身的工作；
    /// 处理器 panic 视为失败
    async fn attempt(
        &self,
        handler: &Arc<dyn EventHandler>,
        event: &IntegrationEvent,
    ) -> Result<(), HandlerFailure> {
        let name = handler.handler_name().to_string();
        let task = {
            let handler = Arc::clone(handler);
            let event = event.clone();
            tokio::spawn(async move { handler.handle(&event).await })
        };

        match tokio::time::timeout(self.config.timeout(), task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(HandlerFailure {
                error: BusError::HandlerFailed {
                    handler: name,
                    reason: format!("{err:#}"),
                },
                stack: Some(format!("{err:?}")),
            }),
            Ok(Err(join_err)) => {
                let reason = if join_err.is_panic() {
                    format!(
                        "handler panicked: {}",
                        panic_message(join_err.into_panic().as_ref())
                    )
                } else {
                    "handler task was cancelled".to_string()
                };
                Err(HandlerFailure {
                    error: BusError::HandlerFailed {
                        handler: name,
                        reason,
                    },
                    stack: None,
                })
            }
            Err(_elapsed) => {
                bus_log!(
                    self.config.enable_logging,
                    debug,
                    event_id = event.id(),
                    handler = %name,
                    "attempt timed out; handler keeps running in the background"
                );
                Err(HandlerFailure {
                    error: BusError::Timeout {
                        handler: name,
                        timeout_ms: self.config.timeout_ms,
                    },
                    stack: None,
                })
            }
        }
    }

    // ---- 查询 ----

    pub fn get_events(&self, filter: &EventFilter) -> Vec<IntegrationEvent> {
        self.store.events(filter)
    }

    pub fn get_event(&self, id: &str) -> Option<IntegrationEvent> {
        self.store.event(id)
    }

    pub fn get_errors(&self, resolved: Option<bool>) -> Vec<IntegrationError> {
        self.store.errors(resolved)
    }

    /// 将错误标记为已处理；重复调用无副作用
    pub fn resolve_error(&self, error_id: &str) -> bool {
        self.store.resolve_error(error_id)
    }

    pub fn get_metrics(&self) -> BusMetrics {
        self.store
            .metrics(self.config.health_window, self.config.error_threshold)
    }

    // ---- 清理 ----

    /// 删除早于 `now - older_than_days` 的事件与错误
    pub fn cleanup(&self, older_than_days: u32) -> CleanupReport {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let report = self.store.prune_before(cutoff);
        bus_log!(
            self.config.enable_logging,
            info,
            older_than_days,
            events_removed = report.events_removed,
            errors_removed = report.errors_removed,
            "integration history cleaned up"
        );
        report
    }

    pub fn cleanup_default(&self) -> CleanupReport {
        self.cleanup(DEFAULT_RETENTION_DAYS)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::handler_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn test_config() -> BusConfig {
        BusConfig {
            timeout_ms: 50,
            retry_backoff_ms: 10,
            ..Default::default()
        }
    }

    fn event(ty: &str) -> IntegrationEvent {
        IntegrationEvent::builder()
            .event_type(ty)
            .source_module("breeding")
            .target_module("clinic")
            .payload(json!({ "mare_id": "m-1" }).into())
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failed_attempt() {
        let bus = IntegrationBus::new(test_config()).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        bus.subscribe(
            "slow",
            handler_fn("slow", 0, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    anyhow::Ok(())
                }
            }),
        );

        let ev = bus.emit(event("slow")).await;
        assert_eq!(ev.status(), EventStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let errors = bus.get_errors(None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type(), ErrorKind::Timeout);
        assert_eq!(errors[0].module_id(), "clinic");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_handler_is_recorded_not_propagated() {
        let bus = IntegrationBus::new(BusConfig {
            retry_attempts: 1,
            ..test_config()
        })
        .unwrap();
        bus.subscribe(
            "boom",
            handler_fn("boom", 0, |_| async {
                if true {
                    panic!("stall door jammed");
                }
                anyhow::Ok(())
            }),
        );

        let ev = bus.emit(event("boom")).await;
        assert_eq!(ev.status(), EventStatus::Failed);
        assert!(ev.error().unwrap().contains("stall door jammed"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_pending_event_is_not_dispatched() {
        let bus = IntegrationBus::new(test_config()).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        bus.subscribe(
            "once",
            handler_fn("once", 0, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            }),
        );

        let done = bus.emit(event("once")).await;
        assert_eq!(done.status(), EventStatus::Completed);

        let again = bus.emit(done.clone()).await;
        assert_eq!(again.status(), EventStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.get_metrics().total_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unhandled_policies() {
        let complete = IntegrationBus::new(BusConfig {
            unhandled: UnhandledPolicy::Complete,
            ..test_config()
        })
        .unwrap();
        let ev = complete.emit(event("nobody_listens")).await;
        assert_eq!(ev.status(), EventStatus::Completed);
        assert!(complete.get_errors(None).is_empty());

        let fail = IntegrationBus::new(BusConfig {
            unhandled: UnhandledPolicy::Fail,
            ..test_config()
        })
        .unwrap();
        let ev = fail.emit(event("nobody_listens")).await;
        assert_eq!(ev.status(), EventStatus::Failed);
        let errors = fail.get_errors(Some(false));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type(), ErrorKind::Unhandled);
        assert_eq!(errors[0].event_id(), ev.id());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempt_keeps_running_to_completion() {
        let bus = Arc::new(
            IntegrationBus::new(BusConfig {
                retry_attempts: 1,
                ..test_config()
            })
            .unwrap(),
        );
        bus.subscribe(
            "invoice_requested",
            handler_fn("finance.slow_ledger", 0, |_| async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                anyhow::Ok(())
            }),
        );
        let chained = bus.clone();
        bus.subscribe(
            "exam_done",
            handler_fn("clinic.bill_owner", 0, move |_| {
                let bus = chained.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let invoice = IntegrationEvent::builder()
                        .id("invoice-1")
                        .event_type("invoice_requested")
                        .source_module("clinic")
                        .target_module("finance")
                        .payload(json!({ "amount_cents": 9_000 }).into())
                        .build();
                    bus.emit(invoice).await;
                    anyhow::Ok(())
                }
            }),
        );

        let outer = bus.emit(event("exam_done")).await;
        assert_eq!(outer.status(), EventStatus::Failed);
        assert_eq!(bus.get_errors(None)[0].error_type(), ErrorKind::Timeout);
        assert_eq!(
            bus.get_event("invoice-1").map(|e| e.status()),
            Some(EventStatus::Processing)
        );

        // 外层等待已超时，但嵌套分发仍在后台跑完
        tokio::time::sleep(Duration::from_millis(100)).await;
        let invoice = bus.get_event("invoice-1").unwrap();
        assert_eq!(invoice.status(), EventStatus::Completed);
        assert!(invoice.processed_at().is_some());
        assert_eq!(bus.get_errors(None).len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = IntegrationBus::new(BusConfig {
            handler_concurrency: 0,
            ..Default::default()
        })
        .err()
        .expect("config should be rejected");
        assert!(matches!(err, BusError::InvalidConfig { .. }));
    }
}
