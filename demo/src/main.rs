use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use equine_eventing::event::payload::{
    BREEDING_SCHEDULED, INVOICE_REQUESTED, PREGNANCY_CONFIRMED,
};
use equine_eventing::event::{EventPayload, IntegrationEvent};
use equine_eventing::eventing::{EventFilter, EventHandler, IntegrationBus};
use equine_eventing::BusConfig;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

const CONFIG_ENV: &str = "EQUINE_BUS_CONFIG";

#[derive(Debug, thiserror::Error)]
enum ClinicError {
    #[error("cannot book an exam in the past: mare={mare_id}")]
    PastAppointment { mare_id: String },
    #[error("unexpected payload for {0}")]
    UnexpectedPayload(String),
}

#[derive(Debug, Clone)]
struct Appointment {
    mare_id: String,
    kind: &'static str,
}

/// 诊所：配种排期后安排配种前检查，妊娠确认后安排产前复查，并向财务请求开票
///
/// 总线的注册表持有本处理器，这里只保留弱引用，避免循环引用
struct ClinicScheduler {
    bus: Weak<IntegrationBus>,
    appointments: Mutex<Vec<Appointment>>,
}

#[async_trait]
impl EventHandler for ClinicScheduler {
    fn handler_name(&self) -> &str {
        "clinic.scheduler"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn handle(&self, event: &IntegrationEvent) -> anyhow::Result<()> {
        let (mare_id, kind) = match event.payload() {
            EventPayload::BreedingScheduled {
                mare_id,
                scheduled_for,
                ..
            } => {
                if *scheduled_for < Utc::now() {
                    return Err(ClinicError::PastAppointment {
                        mare_id: mare_id.clone(),
                    }
                    .into());
                }
                (mare_id.clone(), "pre_breeding_exam")
            }
            EventPayload::PregnancyConfirmed { mare_id, .. } => {
                (mare_id.clone(), "prenatal_check")
            }
            _ => {
                let event_type = event.event_type().to_string();
                return Err(ClinicError::UnexpectedPayload(event_type).into());
            }
        };

        self.appointments.lock().push(Appointment {
            mare_id: mare_id.clone(),
            kind,
        });
        tracing::info!(mare_id = %mare_id, kind, "clinic appointment booked");

        let invoice = IntegrationEvent::builder()
            .id(Ulid::new().to_string())
            .event_type(INVOICE_REQUESTED)
            .source_module("clinic")
            .target_module("finance")
            .maybe_tenant_id(event.tenant_id().map(str::to_string))
            .payload(EventPayload::InvoiceRequested {
                client_id: format!("owner-of-{mare_id}"),
                amount_cents: 12_500,
                currency: "EUR".into(),
            })
            .build();
        let Some(bus) = self.bus.upgrade() else {
            anyhow::bail!("integration bus already dropped");
        };
        bus.emit(invoice).await;
        Ok(())
    }
}

/// 财务：累计开票金额
#[derive(Default)]
struct FinanceLedger {
    total_cents: Mutex<i64>,
}

#[async_trait]
impl EventHandler for FinanceLedger {
    fn handler_name(&self) -> &str {
        "finance.ledger"
    }

    async fn handle(&self, event: &IntegrationEvent) -> anyhow::Result<()> {
        if let EventPayload::InvoiceRequested { amount_cents, .. } = event.payload() {
            *self.total_cents.lock() += amount_cents;
        }
        Ok(())
    }
}

/// 厩舍：妊娠确认后预留产驹厩位
#[derive(Default)]
struct StableRooms {
    reserved: Mutex<Vec<(String, Option<NaiveDate>)>>,
}

#[async_trait]
impl EventHandler for StableRooms {
    fn handler_name(&self) -> &str {
        "stable.foaling_boxes"
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn handle(&self, event: &IntegrationEvent) -> anyhow::Result<()> {
        if let EventPayload::PregnancyConfirmed {
            mare_id,
            expected_foaling,
            ..
        } = event.payload()
        {
            self.reserved.lock().push((mare_id.clone(), *expected_foaling));
        }
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,equine_eventing=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// 配置来源：`EQUINE_BUS_CONFIG` 指向的 JSON 文件；未设置时使用适合演示的短退避
fn load_config() -> anyhow::Result<BusConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let config = BusConfig::from_json(&raw)?;
            tracing::info!(path = %path, "bus config loaded");
            Ok(config)
        }
        Err(_) => Ok(BusConfig {
            retry_backoff_ms: 50,
            timeout_ms: 2_000,
            ..Default::default()
        }),
    }
}

fn breeding(mare_id: &str, in_days: i64) -> IntegrationEvent {
    IntegrationEvent::builder()
        .id(Ulid::new().to_string())
        .event_type(BREEDING_SCHEDULED)
        .source_module("breeding")
        .target_module("clinic")
        .tenant_id("willow-creek-stables")
        .payload(EventPayload::BreedingScheduled {
            mare_id: mare_id.into(),
            stallion_id: Some("stallion-3".into()),
            scheduled_for: Utc::now() + ChronoDuration::days(in_days),
        })
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let bus = Arc::new(IntegrationBus::new(load_config()?)?);
    let retention = bus.start_retention(Duration::from_secs(3600), 30);

    let clinic = Arc::new(ClinicScheduler {
        bus: Arc::downgrade(&bus),
        appointments: Mutex::new(Vec::new()),
    });
    let finance = Arc::new(FinanceLedger::default());
    let stable = Arc::new(StableRooms::default());

    bus.subscribe(BREEDING_SCHEDULED, clinic.clone());
    bus.subscribe(PREGNANCY_CONFIRMED, clinic.clone());
    bus.subscribe(PREGNANCY_CONFIRMED, stable.clone());
    bus.subscribe(INVOICE_REQUESTED, finance.clone());

    let ok = bus.emit(breeding("mare-17", 3)).await;
    println!("{} {} -> {}", ok.event_type(), ok.id(), ok.status());

    // 排期已过：诊所处理器重试耗尽后失败
    let late = bus.emit(breeding("mare-21", -1)).await;
    println!(
        "{} {} -> {} ({})",
        late.event_type(),
        late.id(),
        late.status(),
        late.error().unwrap_or_default()
    );

    let today = Utc::now().date_naive();
    let pregnancy = IntegrationEvent::from_payload(
        "breeding",
        "stable",
        EventPayload::PregnancyConfirmed {
            mare_id: "mare-17".into(),
            confirmed_on: today,
            expected_foaling: today.checked_add_days(chrono::Days::new(340)),
        },
    );
    let confirmed = bus.emit(pregnancy).await;
    println!("{} {} -> {}", confirmed.event_type(), confirmed.id(), confirmed.status());

    println!("clinic appointments: {:?}", clinic.appointments.lock());
    println!("stable reservations: {:?}", stable.reserved.lock());
    println!("invoiced: {} cents", finance.total_cents.lock());

    for error in bus.get_errors(Some(false)) {
        println!(
            "unresolved error {} on event {} [{}]: {}",
            error.id(),
            error.event_id(),
            error.module_id(),
            error.message()
        );
        bus.resolve_error(error.id());
    }

    let recent = bus.get_events(
        &EventFilter::builder()
            .module_id("clinic")
            .limit(5)
            .build(),
    );
    println!("recent clinic events: {}", recent.len());
    println!("{}", serde_json::to_string_pretty(&bus.get_metrics())?);

    retention.join().await;
    Ok(())
}
