//! 集成事件（Integration Event）数据模型
//!
//! 定义事件记录及其生命周期状态、按事件类型区分的负载联合体，
//! 以及处理器耗尽重试后追加的错误记录。

mod integration_error;
mod integration_event;
pub mod payload;
mod status;

pub use integration_error::{ErrorKind, IntegrationError};
pub use integration_event::IntegrationEvent;
pub use payload::EventPayload;
pub use status::EventStatus;
