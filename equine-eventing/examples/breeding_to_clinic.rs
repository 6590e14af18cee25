/// 集成事件总线（内存版）示例
/// 展示 breeding -> clinic 的订阅与分发，以及处理器失败后的重试、错误记录与健康指标
use anyhow::Result as AnyResult;
use chrono::{Duration as ChronoDuration, Utc};
use equine_eventing::event::{EventPayload, IntegrationEvent};
use equine_eventing::eventing::{EventFilter, IntegrationBus, handler_fn};
use equine_eventing::BusConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("equine_eventing=debug")),
        )
        .init();

    let bus = Arc::new(IntegrationBus::new(BusConfig {
        retry_backoff_ms: 100,
        ..Default::default()
    })?);

    // ============================================================================
    // 诊所模块：配种排期后安排配种前检查，前两次调用失败
    // ============================================================================

    let exam_calls = Arc::new(AtomicU32::new(0));
    let calls = exam_calls.clone();
    bus.subscribe(
        "breeding_scheduled",
        handler_fn("clinic.pre_breeding_exam", 10, move |event| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    anyhow::bail!("vet calendar busy (attempt {n})");
                }
                println!("clinic: exam booked for event {}", event.id());
                Ok(())
            }
        }),
    );

    // ============================================================================
    // 厩舍模块：低优先级，与诊所处理器并发执行
    // ============================================================================

    bus.subscribe(
        "breeding_scheduled",
        handler_fn("stable.reserve_foaling_box", 1, |event| async move {
            if let EventPayload::BreedingScheduled { mare_id, .. } = event.payload() {
                println!("stable: foaling box reserved for {mare_id}");
            }
            anyhow::Ok(())
        }),
    );

    let event = IntegrationEvent::from_payload(
        "breeding",
        "clinic",
        EventPayload::BreedingScheduled {
            mare_id: "mare-17".into(),
            stallion_id: Some("stallion-3".into()),
            scheduled_for: Utc::now() + ChronoDuration::days(3),
        },
    );
    let done = bus.emit(event).await;
    println!(
        "event {} -> {} (retries: {}, exam calls: {})",
        done.id(),
        done.status(),
        done.retry_count(),
        exam_calls.load(Ordering::SeqCst)
    );

    // 化验结果没有订阅者：保持 pending
    let lab = IntegrationEvent::from_payload(
        "laboratory",
        "clinic",
        EventPayload::LabResultReady {
            horse_id: "horse-4".into(),
            sample_id: "sample-88".into(),
            abnormal: false,
        },
    );
    let pending = bus.emit(lab).await;
    println!("event {} -> {}", pending.id(), pending.status());

    for ev in bus.get_events(&EventFilter::builder().module_id("clinic").build()) {
        println!("  history: {} {} {}", ev.created_at(), ev.event_type(), ev.status());
    }
    println!("metrics: {}", serde_json::to_string_pretty(&bus.get_metrics())?);

    Ok(())
}
