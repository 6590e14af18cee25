//! 历史保留（Retention）
//!
//! 周期性调用 `IntegrationBus::cleanup`，替代调用方手动清理。
//! 返回的 `RetentionHandle` 可用于关闭与等待；句柄被丢弃时任务随之取消。
//!
use super::IntegrationBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

impl IntegrationBus {
    /// 启动周期清理任务，每个 `interval` 删除早于 `older_than_days` 的历史
    pub fn start_retention(
        self: &Arc<Self>,
        interval: Duration,
        older_than_days: u32,
    ) -> RetentionHandle {
        let token = CancellationToken::new();
        let bus = Arc::clone(self);

        let task = spawn_periodic(token.clone(), interval, move || {
            bus.cleanup(older_than_days);
        });

        RetentionHandle {
            token,
            task: Some(task),
        }
    }
}

fn spawn_periodic<F>(token: CancellationToken, interval: Duration, mut f: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval 的第一次 tick 立即完成，跳过以避免启动即清理
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => f(),
            }
        }
    })
}

/// 保留任务句柄：用于优雅关闭与等待任务结束
pub struct RetentionHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RetentionHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn join(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RetentionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::event::IntegrationEvent;
    use crate::eventing::EventFilter;
    use chrono::Utc;
    use serde_json::json;

    fn aged_event(id: &str, days_ago: i64) -> IntegrationEvent {
        IntegrationEvent::builder()
            .id(id)
            .event_type("stall_cleaned")
            .source_module("stable")
            .target_module("hr")
            .payload(json!({}).into())
            .created_at(Utc::now() - chrono::Duration::days(days_ago))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_cleanup_prunes_old_history() {
        let bus = Arc::new(
            IntegrationBus::new(BusConfig {
                enable_logging: false,
                ..Default::default()
            })
            .unwrap(),
        );
        // 无处理器：事件保持 pending 但会进入历史
        bus.emit(aged_event("old", 45)).await;
        bus.emit(aged_event("recent", 2)).await;

        let handle = bus.start_retention(Duration::from_secs(60), 30);
        time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let ids: Vec<String> = bus
            .get_events(&EventFilter::default())
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["recent".to_string()]);

        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels_worker() {
        let bus = Arc::new(IntegrationBus::default());
        let handle = bus.start_retention(Duration::from_secs(1), 30);
        let token = handle.token.clone();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
