//! 处理器注册表（HandlerRegistry）
//!
//! 按事件类型维护处理器列表，每次注册后按优先级降序稳定排序。
//! 不做去重：同一处理器重复注册会被分发多次。
//!
use super::EventHandler;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct HandlerRegistry {
    by_type: DashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        let mut list = self.by_type.entry(event_type.to_string()).or_default();
        list.push(handler);
        // 稳定排序：同优先级保持注册顺序
        list.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    /// 移除第一个同一实例（指针相等）的处理器；未找到时返回 false
    pub fn unsubscribe(&self, event_type: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let Some(mut list) = self.by_type.get_mut(event_type) else {
            return false;
        };

        let Some(pos) = list.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        list.remove(pos);
        true
    }

    /// 返回分发列表的快照，按优先级降序
    pub fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.by_type
            .get(event_type)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.by_type.get(event_type).map_or(0, |list| list.len())
    }

    pub fn event_types(&self) -> Vec<String> {
        self.by_type
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

// 只比较数据指针，忽略 vtable
fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
