//! 事件处理器（EventHandler）
//!
//! 定义消费某类事件的处理逻辑与元信息（名称、优先级），
//! 以及把异步闭包包装为处理器的 `FnHandler`。
//!
use crate::event::IntegrationEvent;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// 事件处理器：对某一类型的事件执行副作用（如调用其他模块的接口）
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与错误记录）
    fn handler_name(&self) -> &str;

    /// 优先级，数值越大越靠前
    fn priority(&self) -> i32 {
        0
    }

    /// 处理事件
    async fn handle(&self, event: &IntegrationEvent) -> anyhow::Result<()>;
}

/// 以异步闭包实现的处理器
pub struct FnHandler<F> {
    name: String,
    priority: i32,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, priority: i32, f: F) -> Self {
        Self {
            name: name.into(),
            priority,
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(IntegrationEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle(&self, event: &IntegrationEvent) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}

/// 便捷构造：返回可直接传给 `subscribe` 的 `Arc<dyn EventHandler>`
///
/// ```rust
/// use equine_eventing::eventing::{EventHandler, handler_fn};
///
/// let h = handler_fn("clinic.pre_breeding_exam", 10, |event| async move {
///     assert!(!event.id().is_empty());
///     anyhow::Ok(())
/// });
/// assert_eq!(h.priority(), 10);
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, priority: i32, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(IntegrationEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler::new(name, priority, f))
}
