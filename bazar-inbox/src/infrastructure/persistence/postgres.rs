//! PostgreSQL 存储实现
//!
//! 会话去重由 (participant_low, participant_high, COALESCE(listing_id, ''))
//! 唯一索引保证，插入走 ON CONFLICT DO NOTHING，零行受影响即为冲突。

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row, postgres::PgRow};
use ulid::Ulid;

use bazar_chat_core::config::PostgresInstanceConfig;

use crate::domain::model::{
    Conversation, CounterpartProfile, ListingCard, Message, MessageDraft, ParticipantPair,
};
use crate::domain::repository::{
    ConversationStore, ListingStore, MessageStore, ProfileStore, StoreResult,
};
use crate::error::StoreError;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// 会话与消息的 PostgreSQL 存储
pub struct PostgresInboxStore {
    pool: PgPool,
}

impl PostgresInboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 返回底层连接池，供共享同一实例的其他存储使用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 按实例配置建立连接池
    pub async fn connect(config: &PostgresInstanceConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
            .acquire_timeout(Duration::from_secs(
                config
                    .acquire_timeout_secs
                    .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            ))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self::new(pool))
    }

    /// 初始化数据库表结构（如果不存在）
    ///
    /// 注意：表结构必须与 deploy/init.sql 中的定义一致。
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                participant_low TEXT NOT NULL,
                participant_high TEXT NOT NULL,
                listing_id TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create conversations table")?;

        // 去重唯一索引：无商品上下文以空串参与索引
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_pair_listing
            ON conversations(participant_low, participant_high, COALESCE(listing_id, ''))
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create conversation dedup index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_conversations_low_activity
            ON conversations(participant_low, updated_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create participant_low index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_conversations_high_activity
            ON conversations(participant_high, updated_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create participant_high index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id TEXT NOT NULL,
                content TEXT NOT NULL,
                listing_id TEXT,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create messages table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
            ON messages(conversation_id, created_at, id)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create message ordering index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(conversation_id, sender_id)
            WHERE is_read = FALSE
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create unread index")?;

        Ok(())
    }
}

fn row_to_conversation(row: &PgRow) -> StoreResult<Conversation> {
    let low: String = row.get("participant_low");
    let high: String = row.get("participant_high");
    let pair = ParticipantPair::new(&low, &high)
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("Corrupt participant pair: {e}")))?;
    Ok(Conversation {
        id: row.get("id"),
        pair,
        listing_id: row.get("listing_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_message(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        listing_id: row.get("listing_id"),
        read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ConversationStore for PostgresInboxStore {
    async fn insert(&self, conversation: &Conversation) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO conversations
                (id, participant_low, participant_high, listing_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&conversation.id)
        .bind(conversation.pair.low())
        .bind(conversation.pair.high())
        .bind(&conversation.listing_id)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert conversation")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn find_by_pair(
        &self,
        pair: &ParticipantPair,
        listing_id: Option<&str>,
    ) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, listing_id, created_at, updated_at
            FROM conversations
            WHERE participant_low = $1
              AND participant_high = $2
              AND COALESCE(listing_id, '') = $3
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .bind(listing_id.unwrap_or(""))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find conversation by pair")?;

        row.map(|r| row_to_conversation(&r)).transpose()
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, listing_id, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get conversation")?;

        row.map(|r| row_to_conversation(&r)).transpose()
    }

    async fn list_for_actor(&self, actor_id: &str) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, listing_id, created_at, updated_at
            FROM conversations
            WHERE participant_low = $1 OR participant_high = $1
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list conversations")?;

        rows.iter().map(row_to_conversation).collect()
    }

    async fn touch_updated_at(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET updated_at = GREATEST(updated_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("Failed to touch conversation")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(conversation_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PostgresInboxStore {
    async fn insert(&self, draft: &MessageDraft) -> StoreResult<Message> {
        let message = Message {
            id: Ulid::new().to_string(),
            conversation_id: draft.conversation_id.clone(),
            sender_id: draft.sender_id.clone(),
            content: draft.content.clone(),
            listing_id: draft.listing_id.clone(),
            read: false,
            created_at: Utc::now(),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, content, listing_id, is_read, created_at)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE EXISTS (SELECT 1 FROM conversations WHERE id = $2)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(&message.listing_id)
        .bind(message.read)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(draft.conversation_id.clone()));
        }
        Ok(message)
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Message>> {
        // 取最近 limit 条，再翻回升序
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, listing_id, is_read, created_at
            FROM (
                SELECT id, conversation_id, sender_id, content, listing_id, is_read, created_at
                FROM messages
                WHERE conversation_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list messages")?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    async fn latest_for_conversation(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<Message>> {
        let row = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, listing_id, is_read, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest message")?;

        Ok(row.map(|r| row_to_message(&r)))
    }

    async fn count_unread(&self, conversation_id: &str, actor_id: &str) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS unread
            FROM messages
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(actor_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count unread messages")?;

        Ok(row.get::<i64, _>("unread"))
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark conversation read")?;

        Ok(result.rows_affected())
    }

    async fn mark_read(&self, message_id: &str, reader_id: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(message_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark message read")?;

        if result.rows_affected() == 0 {
            // 区分消息缺失与已置位 / 发送方自己的消息（后两者为幂等 no-op）
            let exists = sqlx::query("SELECT 1 FROM messages WHERE id = $1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to check message existence")?;
            if exists.is_none() {
                return Err(StoreError::NotFound(message_id.to_string()));
            }
        }
        Ok(())
    }
}

/// 用户资料查询（identity 子系统维护的表，这里只读）
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<CounterpartProfile>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, display_name, avatar_url
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load user profile")?;

        Ok(row.map(|r| CounterpartProfile {
            user_id: r.get("user_id"),
            display_name: r.get("display_name"),
            avatar_url: r.get("avatar_url"),
        }))
    }
}

/// 商品卡片查询（catalog 子系统维护的表，这里只读）
pub struct PostgresListingStore {
    pool: PgPool,
}

impl PostgresListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingStore for PostgresListingStore {
    async fn get_listing(&self, listing_id: &str) -> StoreResult<Option<ListingCard>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, price_cents, currency, image_url
            FROM listings
            WHERE id = $1
            "#,
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load listing")?;

        Ok(row.map(|r| ListingCard {
            listing_id: r.get("id"),
            title: r.get("title"),
            price_cents: r.get("price_cents"),
            currency: r.get("currency"),
            image_url: r.get("image_url"),
        }))
    }
}
