//! 未读聚合
//!
//! 跨全部会话的未读总数（角标数字）。上一次计算的结果缓存在本地，
//! UI 可以立即显示再异步重算；未登录恒为 0，不触碰存储。

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use crate::domain::service::InboxDomainService;
use crate::error::InboxError;

/// 未读角标聚合器
pub struct UnreadBadge {
    service: Arc<InboxDomainService>,
    cached: AtomicI64,
}

impl UnreadBadge {
    pub fn new(service: Arc<InboxDomainService>) -> Self {
        Self {
            service,
            cached: AtomicI64::new(0),
        }
    }

    /// 上一次计算的总数
    pub fn cached(&self) -> i64 {
        self.cached.load(Ordering::Relaxed)
    }

    /// 重算未读总数并更新缓存
    ///
    /// `actor_id` 为 None（未登录）时恒为 0，不访问存储。
    pub async fn refresh(&self, actor_id: Option<&str>) -> Result<i64, InboxError> {
        let total = match actor_id {
            Some(actor_id) => self.service.unread_total(actor_id).await?,
            None => 0,
        };
        self.cached.store(total, Ordering::Relaxed);
        debug!(actor_id = ?actor_id, total, "Unread badge refreshed");
        Ok(total)
    }
}
