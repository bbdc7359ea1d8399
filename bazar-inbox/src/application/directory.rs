//! 会话目录
//!
//! actor 的全部会话列表（最近活动倒序，逐行富化），持有全局变更流
//! 订阅：任何插入或已读事件都意味着目录该刷新了。

use std::sync::Arc;

use tracing::debug;

use crate::domain::event::ChangeEvent;
use crate::domain::model::ConversationSummary;
use crate::domain::repository::FeedSubscription;
use crate::domain::service::InboxDomainService;
use crate::error::InboxError;

/// 会话目录视图
pub struct ConversationDirectory {
    actor_id: String,
    service: Arc<InboxDomainService>,
    subscription: FeedSubscription,
    summaries: Vec<ConversationSummary>,
}

impl ConversationDirectory {
    /// 建立目录视图：先订阅全局变更流，再由调用方 refresh
    pub fn open(service: Arc<InboxDomainService>, actor_id: &str) -> Self {
        let subscription = service.feed().subscribe_all();
        Self {
            actor_id: actor_id.to_string(),
            service,
            subscription,
            summaries: Vec::new(),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// 上一次 refresh 的结果
    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    /// 重新拉取目录
    pub async fn refresh(&mut self) -> Result<&[ConversationSummary], InboxError> {
        self.summaries = self.service.list_conversations(&self.actor_id).await?;
        debug!(
            actor_id = %self.actor_id,
            count = self.summaries.len(),
            "Directory refreshed"
        );
        Ok(&self.summaries)
    }

    /// 等待下一条变更事件（刷新信号）；变更流关闭时返回 None
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        self.subscription.recv().await
    }

    /// 排空缓冲中的变更事件，返回条数；大于 0 说明目录已过期
    pub fn take_pending_changes(&mut self) -> usize {
        let mut drained = 0;
        while self.subscription.try_recv().is_some() {
            drained += 1;
        }
        drained
    }
}
