//! 进程内变更流
//!
//! 单进程部署与测试使用的 tokio broadcast 扇出。

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::event::ChangeEvent;
use crate::domain::repository::{ChangeFeed, FeedSubscription, StoreResult};

pub const DEFAULT_FEED_BUFFER: usize = 256;

/// 基于 tokio broadcast 的变更流
pub struct LocalChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl LocalChangeFeed {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_BUFFER)
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> StoreResult<()> {
        // 没有任何订阅者时 send 返回 Err，对发布方不是失败
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe_conversation(&self, conversation_id: &str) -> FeedSubscription {
        FeedSubscription::new(
            self.sender.subscribe(),
            Some(conversation_id.to_string()),
        )
    }

    fn subscribe_all(&self) -> FeedSubscription {
        FeedSubscription::new(self.sender.subscribe(), None)
    }
}
