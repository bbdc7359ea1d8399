//! 存储与变更流接口定义
//!
//! 领域层只面向这组 trait 编程，PostgreSQL / memory / redis 实现
//! 在 infrastructure 层注入（作为 trait 对象使用，保留 async-trait）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;

use bazar_chat_core::metrics::INBOX_METRICS;

use crate::domain::event::ChangeEvent;
use crate::domain::model::{
    Conversation, CounterpartProfile, ListingCard, Message, MessageDraft, ParticipantPair,
};
use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 会话仓储接口
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 插入新会话
    ///
    /// (participant_low, participant_high, listing 上下文) 唯一索引命中时
    /// 返回 `StoreError::Conflict`，调用方按既有会话重查处理。
    async fn insert(&self, conversation: &Conversation) -> StoreResult<()>;

    async fn find_by_pair(
        &self,
        pair: &ParticipantPair,
        listing_id: Option<&str>,
    ) -> StoreResult<Option<Conversation>>;

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<Conversation>>;

    /// actor 参与的所有会话，updated_at 倒序
    async fn list_for_actor(&self, actor_id: &str) -> StoreResult<Vec<Conversation>>;

    /// 投递消息后推进会话的 updated_at
    async fn touch_updated_at(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// 消息仓储接口
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化草稿，由存储分配真实 ID 与服务端时间戳
    async fn insert(&self, draft: &MessageDraft) -> StoreResult<Message>;

    /// 最近 limit 条消息，按 created_at 升序返回（id 升序兜底）
    async fn list_for_conversation(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Message>>;

    async fn latest_for_conversation(&self, conversation_id: &str)
    -> StoreResult<Option<Message>>;

    /// actor 视角的未读数（对方发送且未读）
    async fn count_unread(&self, conversation_id: &str, actor_id: &str) -> StoreResult<i64>;

    /// 批量已读：会话内非 reader 发送且未读的消息全部置位，返回翻转行数
    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> StoreResult<u64>;

    /// 单条已读（实时接收路径），reader 不能是发送方
    async fn mark_read(&self, message_id: &str, reader_id: &str) -> StoreResult<()>;
}

/// 用户资料查询接口（目录富化用，失败可降级）
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<CounterpartProfile>>;
}

/// 商品查询接口（目录富化用，失败可降级）
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn get_listing(&self, listing_id: &str) -> StoreResult<Option<ListingCard>>;
}

/// 变更流接口
///
/// publish 只在持久化成功之后调用；投递语义 at-least-once，
/// 消费方通过按 ID 收敛容忍重复。
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn publish(&self, event: ChangeEvent) -> StoreResult<()>;

    /// 订阅单个会话的事件
    fn subscribe_conversation(&self, conversation_id: &str) -> FeedSubscription;

    /// 订阅全部事件（目录与未读角标用）
    fn subscribe_all(&self) -> FeedSubscription;
}

/// 变更流订阅句柄
///
/// 句柄被 drop 即完成退订，无须显式清理。消费侧落后太多时
/// 广播缓冲会跳过（Lagged），跳过的条目靠下一次全量加载补齐。
pub struct FeedSubscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    conversation_filter: Option<String>,
}

impl FeedSubscription {
    pub fn new(
        receiver: broadcast::Receiver<ChangeEvent>,
        conversation_filter: Option<String>,
    ) -> Self {
        Self {
            receiver,
            conversation_filter,
        }
    }

    fn matches(&self, event: &ChangeEvent) -> bool {
        match &self.conversation_filter {
            Some(conversation_id) => event.conversation_id() == conversation_id,
            None => true,
        }
    }

    /// 等待下一条通过过滤的事件；变更流关闭时返回 None
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    INBOX_METRICS
                        .realtime_events_total
                        .with_label_values(&["lagged"])
                        .inc();
                    warn!(skipped, "Change feed subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞拉取：缓冲里没有匹配事件时立即返回 None
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    INBOX_METRICS
                        .realtime_events_total
                        .with_label_values(&["lagged"])
                        .inc();
                    warn!(skipped, "Change feed subscriber lagged, events skipped");
                }
                Err(_) => return None,
            }
        }
    }
}
