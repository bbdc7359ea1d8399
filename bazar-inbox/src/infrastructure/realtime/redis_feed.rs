//! Redis 变更流
//!
//! 事件以 JSON 发布到单个 pub/sub 频道；后台桥接任务把收到的
//! 载荷转入进程内 broadcast，订阅语义与 LocalChangeFeed 完全一致。
//! 注意：pub/sub 本身不重放，离线期间的事件靠下一次全量加载补齐。

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use redis::{
    AsyncCommands,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use bazar_chat_core::config::RedisPoolConfig;

use crate::domain::event::ChangeEvent;
use crate::domain::repository::{ChangeFeed, FeedSubscription, StoreResult};

pub const DEFAULT_CHANGE_CHANNEL: &str = "bazar:inbox:changes";

/// 基于 Redis pub/sub 的变更流
pub struct RedisChangeFeed {
    connection: ConnectionManager,
    channel_name: String,
    local: broadcast::Sender<ChangeEvent>,
    bridge: JoinHandle<()>,
}

impl RedisChangeFeed {
    /// 建立发布连接与订阅桥接任务
    pub async fn connect(
        config: &RedisPoolConfig,
        channel_name: &str,
        buffer: usize,
    ) -> Result<Self> {
        let client =
            redis::Client::open(config.url.as_str()).context("Invalid redis url")?;
        let mut manager_config = ConnectionManagerConfig::new();
        if let Some(secs) = config.response_timeout_secs {
            manager_config = manager_config.set_response_timeout(Duration::from_secs(secs));
        }
        let connection = ConnectionManager::new_with_config(client.clone(), manager_config)
            .await
            .context("failed to open redis connection")?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .context("failed to open redis pubsub connection")?;
        pubsub
            .subscribe(channel_name)
            .await
            .context("failed to subscribe change channel")?;

        let (local, _) = broadcast::channel(buffer.max(1));
        let fanout = local.clone();
        let channel_owned = channel_name.to_string();
        let bridge = tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Unreadable change payload, skipping");
                        continue;
                    }
                };
                match serde_json::from_str::<ChangeEvent>(&payload) {
                    Ok(event) => {
                        let _ = fanout.send(event);
                    }
                    Err(e) => {
                        warn!(error = %e, "Malformed change event, skipping");
                    }
                }
            }
            debug!(channel = %channel_owned, "Redis change bridge stopped");
        });

        Ok(Self {
            connection,
            channel_name: channel_name.to_string(),
            local,
            bridge,
        })
    }
}

impl Drop for RedisChangeFeed {
    fn drop(&mut self) {
        self.bridge.abort();
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> StoreResult<()> {
        let payload = serde_json::to_string(&event)
            .context("failed to serialize change event")
            .map_err(crate::error::StoreError::Backend)?;
        let mut conn = self.connection.clone();
        let _subscribers: i64 = conn
            .publish(&self.channel_name, payload)
            .await
            .context("failed to publish change event")
            .map_err(crate::error::StoreError::Backend)?;
        Ok(())
    }

    fn subscribe_conversation(&self, conversation_id: &str) -> FeedSubscription {
        FeedSubscription::new(
            self.local.subscribe(),
            Some(conversation_id.to_string()),
        )
    }

    fn subscribe_all(&self) -> FeedSubscription {
        FeedSubscription::new(self.local.subscribe(), None)
    }
}
