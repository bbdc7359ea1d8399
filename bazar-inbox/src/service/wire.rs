//! Wire 风格的依赖注入模块
//!
//! 类似 Go 的 Wire 框架，按依赖顺序构建收件箱的全部组件

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use bazar_chat_core::BazarAppConfig;

use crate::config::InboxConfig;
use crate::domain::repository::{
    ChangeFeed, ConversationStore, ListingStore, MessageStore, ProfileStore,
};
use crate::domain::service::InboxDomainService;
use crate::infrastructure::persistence::{
    MemoryInboxStore, MemoryListingStore, MemoryProfileStore, PostgresInboxStore,
    PostgresListingStore, PostgresProfileStore,
};
use crate::infrastructure::realtime::{LocalChangeFeed, RedisChangeFeed};
use crate::service::Inbox;

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub inbox: Inbox,
    pub config: InboxConfig,
    /// memory 后端时暴露，供演示和测试写入资料与商品数据
    pub seed: Option<MemorySeedHandles>,
}

/// memory 后端的资料与商品存储句柄
pub struct MemorySeedHandles {
    pub profiles: Arc<MemoryProfileStore>,
    pub listings: Arc<MemoryListingStore>,
}

/// 构建应用上下文
///
/// 类似 Go Wire 的 Initialize 函数，按照依赖顺序构建所有组件
///
/// # 参数
/// * `app_config` - 应用配置
///
/// # 返回
/// * `ApplicationContext` - 构建好的应用上下文
pub async fn initialize(app_config: &BazarAppConfig) -> Result<ApplicationContext> {
    // 1. 加载收件箱配置
    let config = InboxConfig::from_app_config(app_config)
        .context("Failed to load inbox service configuration")?;

    // 2. 创建变更流
    let feed: Arc<dyn ChangeFeed> = match config.feed.as_str() {
        "redis" => {
            let redis_config = config
                .redis
                .as_ref()
                .context("feed = \"redis\" requires a configured redis instance")?;
            info!(
                url = %redis_config.url,
                channel = %config.change_channel,
                "Using Redis change feed"
            );
            Arc::new(
                RedisChangeFeed::connect(redis_config, &config.change_channel, config.feed_buffer)
                    .await
                    .context("Failed to connect Redis change feed")?,
            )
        }
        _ => {
            info!(buffer = config.feed_buffer, "Using in-process change feed");
            Arc::new(LocalChangeFeed::new(config.feed_buffer))
        }
    };

    // 3. 创建存储
    let (conversations, messages, profiles, listings, seed) = match config.backend.as_str() {
        "postgres" => {
            let pg_config = config
                .postgres
                .as_ref()
                .context("backend = \"postgres\" requires a configured postgres instance")?;
            let store = PostgresInboxStore::connect(pg_config)
                .await
                .context("Failed to connect to PostgreSQL")?;
            // 初始化数据库表结构
            store
                .ensure_schema()
                .await
                .context("Failed to initialize inbox schema")?;
            info!("Using PostgreSQL inbox store");
            let pool = store.pool().clone();
            let store = Arc::new(store);
            (
                store.clone() as Arc<dyn ConversationStore>,
                store as Arc<dyn MessageStore>,
                Arc::new(PostgresProfileStore::new(pool.clone())) as Arc<dyn ProfileStore>,
                Arc::new(PostgresListingStore::new(pool)) as Arc<dyn ListingStore>,
                None,
            )
        }
        _ => {
            info!("Using in-memory inbox store");
            let store = Arc::new(MemoryInboxStore::new());
            let profile_store = Arc::new(MemoryProfileStore::new());
            let listing_store = Arc::new(MemoryListingStore::new());
            (
                store.clone() as Arc<dyn ConversationStore>,
                store as Arc<dyn MessageStore>,
                profile_store.clone() as Arc<dyn ProfileStore>,
                listing_store.clone() as Arc<dyn ListingStore>,
                Some(MemorySeedHandles {
                    profiles: profile_store,
                    listings: listing_store,
                }),
            )
        }
    };

    // 4. 创建领域服务
    let service = Arc::new(InboxDomainService::new(
        conversations,
        messages,
        profiles,
        listings,
        feed,
        config.domain_config(),
    ));

    // 5. 组装门面
    Ok(ApplicationContext {
        inbox: Inbox::new(service),
        config,
        seed,
    })
}
