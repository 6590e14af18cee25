//! 事件子系统（eventing）
//!
//! 提供进程内集成事件的订阅、分发与观测：
//! - `EventHandler`：对某类事件执行副作用的处理器；
//! - `HandlerRegistry`：按事件类型、按优先级维护处理器；
//! - `IntegrationBus`：并发分发、超时与线性退避重试、失败记录；
//! - `EventStore`：事件历史与错误日志的环形缓冲，以及派生指标；
//! - `RetentionHandle`：周期清理任务。
//!
pub mod bus;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod retention;
pub mod store;

pub use bus::{DEFAULT_RETENTION_DAYS, IntegrationBus};
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use metrics::{BusMetrics, ModuleHealth};
pub use registry::HandlerRegistry;
pub use retention::RetentionHandle;
pub use store::{CleanupReport, EventFilter, EventStore};
