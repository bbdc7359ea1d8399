//! 应用层：会话通道、目录视图与未读聚合

pub mod channel;
pub mod directory;
pub mod unread;

pub use channel::ConversationChannel;
pub use directory::ConversationDirectory;
pub use unread::UnreadBadge;
