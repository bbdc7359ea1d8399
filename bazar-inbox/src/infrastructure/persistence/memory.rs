//! 内存存储实现
//!
//! memory 后端：测试、演示与单进程部署使用。会话去重通过
//! pair 索引的 entry 锁保证原子性，与 PostgreSQL 唯一索引同语义。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::warn;
use ulid::Ulid;

use crate::domain::model::{
    Conversation, CounterpartProfile, ListingCard, Message, MessageDraft, ParticipantPair,
};
use crate::domain::repository::{
    ConversationStore, ListingStore, MessageStore, ProfileStore, StoreResult,
};
use crate::error::StoreError;

/// 无商品上下文在索引键中的占位
const NO_LISTING_KEY: &str = "";

fn listing_key(listing_id: Option<&str>) -> String {
    listing_id.unwrap_or(NO_LISTING_KEY).to_string()
}

/// 会话与消息的内存存储
#[derive(Default)]
pub struct MemoryInboxStore {
    conversations: DashMap<String, Conversation>,
    /// (low, high, listing_key) -> conversation id，承担唯一索引职责
    pair_index: DashMap<(String, String, String), String>,
    /// conversation id -> 插入顺序消息
    messages: DashMap<String, Vec<Message>>,
    /// message id -> conversation id
    message_index: DashMap<String, String>,
}

impl MemoryInboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_key(pair: &ParticipantPair, listing_id: Option<&str>) -> (String, String, String) {
        (
            pair.low().to_string(),
            pair.high().to_string(),
            listing_key(listing_id),
        )
    }
}

#[async_trait]
impl ConversationStore for MemoryInboxStore {
    async fn insert(&self, conversation: &Conversation) -> StoreResult<()> {
        let key = Self::index_key(&conversation.pair, conversation.listing_id.as_deref());
        // entry 持有分片锁，检查与占位一步完成
        match self.pair_index.entry(key) {
            Entry::Occupied(_) => return Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(conversation.id.clone());
            }
        }
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn find_by_pair(
        &self,
        pair: &ParticipantPair,
        listing_id: Option<&str>,
    ) -> StoreResult<Option<Conversation>> {
        let key = Self::index_key(pair, listing_id);
        let Some(id_entry) = self.pair_index.get(&key) else {
            return Ok(None);
        };
        Ok(self
            .conversations
            .get(id_entry.value())
            .map(|entry| entry.value().clone()))
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Option<Conversation>> {
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_for_actor(&self, actor_id: &str) -> StoreResult<Vec<Conversation>> {
        let mut result: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| entry.value().pair.contains(actor_id))
            .map(|entry| entry.value().clone())
            .collect();
        result.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(result)
    }

    async fn touch_updated_at(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut entry = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        if at > entry.updated_at {
            entry.updated_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryInboxStore {
    async fn insert(&self, draft: &MessageDraft) -> StoreResult<Message> {
        if !self.conversations.contains_key(&draft.conversation_id) {
            return Err(StoreError::NotFound(draft.conversation_id.clone()));
        }
        let message = Message {
            id: Ulid::new().to_string(),
            conversation_id: draft.conversation_id.clone(),
            sender_id: draft.sender_id.clone(),
            content: draft.content.clone(),
            listing_id: draft.listing_id.clone(),
            read: false,
            created_at: Utc::now(),
        };
        self.message_index
            .insert(message.id.clone(), message.conversation_id.clone());
        self.messages
            .entry(draft.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Message>> {
        let Some(entry) = self.messages.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let mut all = entry.value().clone();
        drop(entry);
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        // 取最近 limit 条，保持升序返回
        let limit = limit.max(0) as usize;
        if all.len() > limit {
            all.drain(..all.len() - limit);
        }
        Ok(all)
    }

    async fn latest_for_conversation(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<Message>> {
        let Some(entry) = self.messages.get(conversation_id) else {
            return Ok(None);
        };
        Ok(entry
            .value()
            .iter()
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }

    async fn count_unread(&self, conversation_id: &str, actor_id: &str) -> StoreResult<i64> {
        let Some(entry) = self.messages.get(conversation_id) else {
            return Ok(0);
        };
        Ok(entry
            .value()
            .iter()
            .filter(|m| m.sender_id != actor_id && !m.read)
            .count() as i64)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> StoreResult<u64> {
        let Some(mut entry) = self.messages.get_mut(conversation_id) else {
            return Ok(0);
        };
        let mut flipped = 0u64;
        for message in entry.value_mut() {
            if message.sender_id != reader_id && !message.read {
                message.read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn mark_read(&self, message_id: &str, reader_id: &str) -> StoreResult<()> {
        let conversation_id = self
            .message_index
            .get(message_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(message_id.to_string()))?;
        let mut entry = self
            .messages
            .get_mut(&conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.clone()))?;
        let Some(message) = entry.value_mut().iter_mut().find(|m| m.id == message_id) else {
            return Err(StoreError::NotFound(message_id.to_string()));
        };
        if message.sender_id == reader_id {
            // 发送方不能推进自己消息的已读位
            warn!(message_id = %message_id, reader_id = %reader_id, "Sender attempted to mark own message read");
            return Ok(());
        }
        message.read = true;
        Ok(())
    }
}

/// 用户资料内存存储
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<String, CounterpartProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_profile(&self, profile: CounterpartProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<CounterpartProfile>> {
        Ok(self
            .profiles
            .get(user_id)
            .map(|entry| entry.value().clone()))
    }
}

/// 商品内存存储
#[derive(Default)]
pub struct MemoryListingStore {
    listings: DashMap<String, ListingCard>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_listing(&self, listing: ListingCard) {
        self.listings.insert(listing.listing_id.clone(), listing);
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn get_listing(&self, listing_id: &str) -> StoreResult<Option<ListingCard>> {
        Ok(self
            .listings
            .get(listing_id)
            .map(|entry| entry.value().clone()))
    }
}
