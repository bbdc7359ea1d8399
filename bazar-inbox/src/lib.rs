//! Bazar 收件箱
//!
//! 买卖双方 1:1 会话的乐观消息收发：会话目录、会话通道与未读聚合

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;

pub use application::{ConversationChannel, ConversationDirectory, UnreadBadge};
pub use config::InboxConfig;
pub use domain::event::ChangeEvent;
pub use domain::model::{ChannelState, Conversation, ConversationSummary, Message, MessageDraft};
pub use error::{InboxError, StoreError};
pub use service::Inbox;
pub use service::wire::{ApplicationContext, MemorySeedHandles, initialize};
