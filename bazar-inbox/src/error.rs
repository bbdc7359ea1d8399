//! 统一异常处理模块

use thiserror::Error;

/// 存储与变更流边界的错误类型
///
/// 基础设施实现（PostgreSQL / memory / redis）统一收敛到这组变体，
/// 领域层据此区分可重试、冲突与缺失三类情况。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 唯一性约束冲突（会话去重索引命中）
    #[error("Uniqueness conflict")]
    Conflict,

    /// 目标实体不存在
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// 后端故障（连接、查询、序列化等），可重试
    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// 收件箱应用层错误类型
#[derive(Debug, Error)]
pub enum InboxError {
    /// 消息正文去除空白后为空
    #[error("Message content is empty")]
    EmptyMessage,

    /// 不允许与自己建立会话
    #[error("Cannot open a conversation with yourself")]
    SelfConversation,

    /// 参与者 ID 不合法（如空串）
    #[error("Invalid participant: {0}")]
    InvalidParticipant(String),

    /// 会话不存在
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// 通道尚未完成加载（或正在发送）
    #[error("Channel is not ready")]
    ChannelNotReady,

    /// 存储边界错误透传
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InboxError {
    /// 错误是否值得调用方原样重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, InboxError::Store(StoreError::Backend(_)))
    }
}
