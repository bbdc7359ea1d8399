//! 收件箱领域模型
//!
//! 会话、消息、会话摘要等核心实体与值对象定义。

pub mod participant_pair;
pub mod timeline;

pub use participant_pair::ParticipantPair;
pub use timeline::{MessageTimeline, UpsertOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::InboxError;

/// 乐观插入使用的临时 ID 前缀
///
/// 持久化 ID 是裸 ULID，两个命名空间永不冲突。
pub const PENDING_ID_PREFIX: &str = "pending-";

// ==================== 会话 ====================

/// 1:1 会话
///
/// 同一对用户针对同一个商品上下文（含"无商品"上下文）至多存在一个会话，
/// 由存储层唯一索引保证。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub pair: ParticipantPair,
    /// 会话关联的商品；None 表示与具体商品无关的私聊
    pub listing_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 每次投递消息时推进，驱动目录排序
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// 工厂方法：分配新 ULID 与当前时间戳
    pub fn create(pair: ParticipantPair, listing_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            pair,
            listing_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// 给定一侧参与者，返回对方
    pub fn counterpart_of(&self, actor: &str) -> Option<&str> {
        self.pair.counterpart_of(actor)
    }
}

// ==================== 消息 ====================

/// 会话内的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    /// 发送时的商品上下文快照
    pub listing_id: Option<String>,
    /// 对方是否已读；只允许 false -> true，且只能由非发送方推进
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// 从草稿生成乐观插入用的临时消息
    pub fn provisional(draft: &MessageDraft) -> Self {
        Self {
            id: format!("{PENDING_ID_PREFIX}{}", Ulid::new()),
            conversation_id: draft.conversation_id.clone(),
            sender_id: draft.sender_id.clone(),
            content: draft.content.clone(),
            listing_id: draft.listing_id.clone(),
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PENDING_ID_PREFIX)
    }
}

/// 发送前的消息草稿
///
/// 构造时完成本地校验（trim 后非空），校验失败不会触碰任何网络或存储。
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub listing_id: Option<String>,
}

impl MessageDraft {
    pub fn new(
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        listing_id: Option<String>,
    ) -> Result<Self, InboxError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(InboxError::EmptyMessage);
        }
        Ok(Self {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: trimmed.to_string(),
            listing_id,
        })
    }
}

// ==================== 目录摘要 ====================

/// 对方用户的展示信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl CounterpartProfile {
    /// 资料查询失败时的占位资料，目录行不因资料缺失而消失
    pub fn placeholder(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: "Unknown user".to_string(),
            avatar_url: None,
        }
    }
}

/// 商品卡片快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCard {
    pub listing_id: String,
    pub title: String,
    pub price_cents: i64,
    pub currency: String,
    pub image_url: Option<String>,
}

/// 目录中的一行：会话 + 对方资料 + 商品卡片 + 最新消息 + 未读数
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub counterpart: CounterpartProfile,
    pub listing: Option<ListingCard>,
    pub latest_message: Option<Message>,
    pub unread_count: i64,
}

impl ConversationSummary {
    /// 目录行的最新消息预览，按字符边界截断
    pub fn preview(&self, max_chars: usize) -> Option<String> {
        self.latest_message
            .as_ref()
            .map(|message| bazar_chat_core::utils::preview(&message.content, max_chars))
    }
}

// ==================== 领域配置 ====================

/// 领域服务配置
#[derive(Debug, Clone)]
pub struct InboxDomainConfig {
    /// 单次历史加载的最大条数
    pub history_limit: i64,
}

impl Default for InboxDomainConfig {
    fn default() -> Self {
        Self { history_limit: 200 }
    }
}

// ==================== 通道状态 ====================

/// 会话通道状态机
///
/// Idle -> Loading -> Ready；Ready -> Sending -> Ready（成功或回滚）；
/// 加载失败进入 Failed，retry 重新回到 Loading。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Loading,
    Ready,
    Sending,
    Failed,
}

impl ChannelState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ChannelState::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_factory_assigns_distinct_ids() {
        let pair = ParticipantPair::new("alice", "bob").unwrap();
        let a = Conversation::create(pair.clone(), None);
        let b = Conversation::create(pair, Some("listing-1".to_string()));
        assert_ne!(a.id, b.id);
        assert!(!a.id.starts_with(PENDING_ID_PREFIX));
        assert_eq!(a.counterpart_of("alice"), Some("bob"));
    }

    #[test]
    fn test_draft_trims_and_rejects_empty() {
        let draft = MessageDraft::new("c1", "alice", "  hello  ", None).unwrap();
        assert_eq!(draft.content, "hello");

        assert!(matches!(
            MessageDraft::new("c1", "alice", "   \n\t ", None),
            Err(InboxError::EmptyMessage)
        ));
    }

    #[test]
    fn test_provisional_message_is_marked() {
        let draft = MessageDraft::new("c1", "alice", "hi", None).unwrap();
        let message = Message::provisional(&draft);
        assert!(message.is_provisional());
        assert!(!message.read);
        assert_eq!(message.conversation_id, "c1");
    }

    #[test]
    fn test_placeholder_profile() {
        let profile = CounterpartProfile::placeholder("ghost");
        assert_eq!(profile.user_id, "ghost");
        assert_eq!(profile.display_name, "Unknown user");
    }

    #[test]
    fn test_summary_preview_truncates_latest_message() {
        let pair = ParticipantPair::new("alice", "bob").unwrap();
        let conversation = Conversation::create(pair, None);
        let draft = MessageDraft::new(&conversation.id, "alice", "a rather long body", None).unwrap();

        let mut summary = ConversationSummary {
            conversation,
            counterpart: CounterpartProfile::placeholder("bob"),
            listing: None,
            latest_message: Some(Message::provisional(&draft)),
            unread_count: 0,
        };
        assert_eq!(summary.preview(8), Some("a rather...".to_string()));

        summary.latest_message = None;
        assert_eq!(summary.preview(8), None);
    }
}
