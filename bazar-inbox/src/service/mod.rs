//! 服务装配层 - 收件箱门面与依赖注入

pub mod wire;

use std::sync::Arc;

use crate::application::{ConversationChannel, ConversationDirectory, UnreadBadge};
use crate::domain::service::InboxDomainService;
use crate::error::InboxError;

/// 收件箱门面
///
/// 对上层暴露三类入口：会话目录、会话通道、全局未读徽标，
/// 内部共享同一个领域服务实例。
pub struct Inbox {
    service: Arc<InboxDomainService>,
}

impl Inbox {
    pub fn new(service: Arc<InboxDomainService>) -> Self {
        Self { service }
    }

    pub fn domain_service(&self) -> Arc<InboxDomainService> {
        Arc::clone(&self.service)
    }

    /// 深链入口：从商品页或用户资料页发起聊天
    ///
    /// 打开（或创建）会话，订阅变更流，然后加载历史。返回的通道
    /// 已处于 Ready 状态；加载失败时错误上抛，重试即再次调用。
    pub async fn open_channel(
        &self,
        actor_id: &str,
        counterpart_id: &str,
        listing_id: Option<&str>,
    ) -> Result<ConversationChannel, InboxError> {
        let conversation = self
            .service
            .open_or_create_conversation(actor_id, counterpart_id, listing_id)
            .await?;
        let mut channel =
            ConversationChannel::open(Arc::clone(&self.service), conversation, actor_id);
        channel.load().await?;
        Ok(channel)
    }

    /// 目录入口：按会话 ID 打开既有会话
    pub async fn open_channel_by_id(
        &self,
        conversation_id: &str,
        actor_id: &str,
    ) -> Result<ConversationChannel, InboxError> {
        let conversation = self
            .service
            .get_conversation_for(conversation_id, actor_id)
            .await?;
        let mut channel =
            ConversationChannel::open(Arc::clone(&self.service), conversation, actor_id);
        channel.load().await?;
        Ok(channel)
    }

    /// 会话目录；调用方随后 refresh 拉取首屏数据
    pub fn directory(&self, actor_id: &str) -> ConversationDirectory {
        ConversationDirectory::open(Arc::clone(&self.service), actor_id)
    }

    /// 全局未读徽标
    pub fn unread_badge(&self) -> UnreadBadge {
        UnreadBadge::new(Arc::clone(&self.service))
    }
}
