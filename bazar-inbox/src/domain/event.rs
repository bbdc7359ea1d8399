//! 变更流事件定义
//!
//! 存储写入成功之后才发布，at-least-once 语义，消费方按 ID 收敛去重。

use serde::{Deserialize, Serialize};

use super::model::Message;

/// 收件箱变更事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// 一条消息已持久化
    MessageInserted { message: Message },
    /// 某个会话的未读消息被 `reader_id` 批量置为已读
    ConversationRead {
        conversation_id: String,
        reader_id: String,
    },
}

impl ChangeEvent {
    /// 事件归属的会话 ID，用于订阅过滤
    pub fn conversation_id(&self) -> &str {
        match self {
            ChangeEvent::MessageInserted { message } => &message.conversation_id,
            ChangeEvent::ConversationRead {
                conversation_id, ..
            } => conversation_id,
        }
    }

    /// 指标标签用的事件类型名
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::MessageInserted { .. } => "message_inserted",
            ChangeEvent::ConversationRead { .. } => "conversation_read",
        }
    }
}
