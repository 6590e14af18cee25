//! 马场管理系统的集成事件总线（equine-eventing）
//!
//! 各业务模块（配种、诊所、化验、药房、财务、人事、厩舍等）之间通过集成事件解耦：
//! 发出方只描述"发生了什么"，由订阅方决定如何响应。例如配种模块发出
//! `breeding_scheduled`，诊所模块订阅后安排配种前检查。
//!
//! 本 crate 提供：
//! - 集成事件模型（`event`）：事件记录、生命周期状态、按类型区分的负载与错误记录；
//! - 事件子系统（`eventing`）：处理器注册、带超时与重试的并发分发、历史查询、
//!   派生指标与按时间清理；
//! - 配置（`config`）与统一错误类型（`error`）。
//!
//! 典型用法：
//! 1. 进程启动时以 `BusConfig` 构造一个 `IntegrationBus`，包装为 `Arc` 注入各模块；
//! 2. 各模块在启动时 `subscribe` 自己关心的事件类型；
//! 3. 发出方构造 `IntegrationEvent` 并 `emit`，根据返回的快照或查询接口获知结果；
//! 4. 通过 `get_metrics` 观察模块健康，定期 `cleanup` 或使用 `start_retention`。
//!
//! ```rust
//! use equine_eventing::event::{EventPayload, EventStatus, IntegrationEvent};
//! use equine_eventing::eventing::{IntegrationBus, handler_fn};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = Arc::new(IntegrationBus::default());
//! bus.subscribe(
//!     "breeding_scheduled",
//!     handler_fn("clinic.pre_breeding_exam", 10, |_event| async { anyhow::Ok(()) }),
//! );
//!
//! let event = IntegrationEvent::from_payload(
//!     "breeding",
//!     "clinic",
//!     EventPayload::BreedingScheduled {
//!         mare_id: "mare-17".into(),
//!         stallion_id: Some("stallion-3".into()),
//!         scheduled_for: chrono::Utc::now(),
//!     },
//! );
//! let done = bus.emit(event).await;
//! assert_eq!(done.status(), EventStatus::Completed);
//! # }
//! ```
//!
pub mod config;
pub mod error;
pub mod event;
pub mod eventing;

pub use config::{BusConfig, DispatchMode, UnhandledPolicy};
pub use error::{BusError, BusResult};
