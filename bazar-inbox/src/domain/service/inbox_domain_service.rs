//! 收件箱领域服务 - 包含所有业务逻辑实现

use std::sync::Arc;

use tracing::{debug, info, warn};

use bazar_chat_core::metrics::INBOX_METRICS;

use crate::domain::event::ChangeEvent;
use crate::domain::model::{
    Conversation, ConversationSummary, CounterpartProfile, InboxDomainConfig, Message,
    MessageDraft, ParticipantPair,
};
use crate::domain::repository::{
    ChangeFeed, ConversationStore, ListingStore, MessageStore, ProfileStore,
};
use crate::error::{InboxError, StoreError};

/// 收件箱领域服务 - 包含所有业务逻辑
pub struct InboxDomainService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    profiles: Arc<dyn ProfileStore>,
    listings: Arc<dyn ListingStore>,
    feed: Arc<dyn ChangeFeed>,
    config: InboxDomainConfig,
}

impl InboxDomainService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        profiles: Arc<dyn ProfileStore>,
        listings: Arc<dyn ListingStore>,
        feed: Arc<dyn ChangeFeed>,
        config: InboxDomainConfig,
    ) -> Self {
        Self {
            conversations,
            messages,
            profiles,
            listings,
            feed,
            config,
        }
    }

    pub fn feed(&self) -> &Arc<dyn ChangeFeed> {
        &self.feed
    }

    /// 打开或创建会话
    ///
    /// 先按规范对查询既有会话；没有则插入新会话，唯一索引冲突视为
    /// 良性（另一端同时创建成功），重查后返回既有会话。
    pub async fn open_or_create_conversation(
        &self,
        actor_id: &str,
        counterpart_id: &str,
        listing_id: Option<&str>,
    ) -> Result<Conversation, InboxError> {
        if actor_id == counterpart_id {
            return Err(InboxError::SelfConversation);
        }
        let pair = ParticipantPair::new(actor_id, counterpart_id)
            .map_err(InboxError::InvalidParticipant)?;

        if let Some(existing) = self.conversations.find_by_pair(&pair, listing_id).await? {
            debug!(
                conversation_id = %existing.id,
                pair = %pair,
                "Conversation already exists"
            );
            INBOX_METRICS
                .conversations_opened_total
                .with_label_values(&["existing"])
                .inc();
            return Ok(existing);
        }

        let candidate = Conversation::create(pair.clone(), listing_id.map(str::to_string));
        match self.conversations.insert(&candidate).await {
            Ok(()) => {
                info!(
                    conversation_id = %candidate.id,
                    pair = %pair,
                    listing_id = ?listing_id,
                    "Conversation created"
                );
                INBOX_METRICS
                    .conversations_opened_total
                    .with_label_values(&["created"])
                    .inc();
                Ok(candidate)
            }
            Err(StoreError::Conflict) => {
                // 对端并发创建先落库，唯一索引挡下了本次插入
                info!(pair = %pair, "Conversation insert conflicted, re-fetching existing row");
                INBOX_METRICS
                    .conversations_opened_total
                    .with_label_values(&["existing"])
                    .inc();
                self.conversations
                    .find_by_pair(&pair, listing_id)
                    .await?
                    .ok_or_else(|| InboxError::ConversationNotFound(pair.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 按 ID 获取会话，校验 actor 是参与者
    pub async fn get_conversation_for(
        &self,
        conversation_id: &str,
        actor_id: &str,
    ) -> Result<Conversation, InboxError> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| InboxError::ConversationNotFound(conversation_id.to_string()))?;
        if !conversation.pair.contains(actor_id) {
            warn!(
                conversation_id = %conversation_id,
                actor_id = %actor_id,
                "Actor is not a participant of the requested conversation"
            );
            return Err(InboxError::ConversationNotFound(conversation_id.to_string()));
        }
        Ok(conversation)
    }

    /// 目录列表：actor 的全部会话，按最近活动倒序，逐行富化
    ///
    /// 资料与商品查询失败只降级该行（占位资料 / 无卡片），
    /// 消息存储失败则整体报错。
    pub async fn list_conversations(
        &self,
        actor_id: &str,
    ) -> Result<Vec<ConversationSummary>, InboxError> {
        let conversations = self.conversations.list_for_actor(actor_id).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(counterpart_id) = conversation.counterpart_of(actor_id) else {
                warn!(
                    conversation_id = %conversation.id,
                    actor_id = %actor_id,
                    "Listed conversation does not contain the actor, skipping"
                );
                continue;
            };
            let counterpart_id = counterpart_id.to_string();

            let counterpart = match self.profiles.get_profile(&counterpart_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => CounterpartProfile::placeholder(&counterpart_id),
                Err(e) => {
                    warn!(
                        user_id = %counterpart_id,
                        error = %e,
                        "Profile lookup failed, using placeholder"
                    );
                    CounterpartProfile::placeholder(&counterpart_id)
                }
            };

            let listing = match &conversation.listing_id {
                Some(listing_id) => match self.listings.get_listing(listing_id).await {
                    Ok(card) => card,
                    Err(e) => {
                        warn!(
                            listing_id = %listing_id,
                            error = %e,
                            "Listing lookup failed, dropping card"
                        );
                        None
                    }
                },
                None => None,
            };

            let latest_message = self
                .messages
                .latest_for_conversation(&conversation.id)
                .await?;
            let unread_count = self
                .messages
                .count_unread(&conversation.id, actor_id)
                .await?;

            summaries.push(ConversationSummary {
                conversation,
                counterpart,
                listing,
                latest_message,
                unread_count,
            });
        }

        // 最近活动优先；同刻按 ID 倒序保证稳定
        summaries.sort_by(|a, b| {
            b.conversation
                .updated_at
                .cmp(&a.conversation.updated_at)
                .then_with(|| b.conversation.id.cmp(&a.conversation.id))
        });

        debug!(actor_id = %actor_id, count = summaries.len(), "Conversation directory listed");
        Ok(summaries)
    }

    /// 全部会话未读数之和
    pub async fn unread_total(&self, actor_id: &str) -> Result<i64, InboxError> {
        let conversations = self.conversations.list_for_actor(actor_id).await?;
        let mut total = 0;
        for conversation in &conversations {
            total += self
                .messages
                .count_unread(&conversation.id, actor_id)
                .await?;
        }
        INBOX_METRICS.unread_recomputes_total.inc();
        Ok(total)
    }

    /// 加载会话历史并批量置已读
    ///
    /// 返回（升序消息列表, 本次翻转的已读条数）。翻转数大于 0 时
    /// 发布 ConversationRead 事件，驱动目录与角标刷新。
    pub async fn load_history(
        &self,
        conversation_id: &str,
        actor_id: &str,
    ) -> Result<(Vec<Message>, u64), InboxError> {
        let timer = INBOX_METRICS.history_load_duration_seconds.start_timer();
        self.get_conversation_for(conversation_id, actor_id).await?;

        let mut messages = self
            .messages
            .list_for_conversation(conversation_id, self.config.history_limit)
            .await?;

        let flipped = self
            .messages
            .mark_conversation_read(conversation_id, actor_id)
            .await?;

        if flipped > 0 {
            // 返回的列表同步反映置位结果
            for message in &mut messages {
                if message.sender_id != actor_id {
                    message.read = true;
                }
            }
            self.publish_lossy(ChangeEvent::ConversationRead {
                conversation_id: conversation_id.to_string(),
                reader_id: actor_id.to_string(),
            })
            .await;
        }

        timer.observe_duration();
        debug!(
            conversation_id = %conversation_id,
            actor_id = %actor_id,
            count = messages.len(),
            marked_read = flipped,
            "History loaded"
        );
        Ok((messages, flipped))
    }

    /// 投递消息：持久化、推进会话活动时间、发布插入事件
    ///
    /// 持久化成功即视为投递成功；之后的 touch / publish 失败只记日志，
    /// 订阅方靠下一次全量加载补齐。
    pub async fn deliver_message(&self, draft: &MessageDraft) -> Result<Message, InboxError> {
        let persisted = self.messages.insert(draft).await?;

        if let Err(e) = self
            .conversations
            .touch_updated_at(&draft.conversation_id, persisted.created_at)
            .await
        {
            warn!(
                conversation_id = %draft.conversation_id,
                error = %e,
                "Failed to touch conversation activity timestamp"
            );
        }

        self.publish_lossy(ChangeEvent::MessageInserted {
            message: persisted.clone(),
        })
        .await;

        info!(
            conversation_id = %persisted.conversation_id,
            message_id = %persisted.id,
            sender_id = %persisted.sender_id,
            "Message delivered"
        );
        Ok(persisted)
    }

    /// 单条置已读（实时接收路径）
    pub async fn mark_message_read(
        &self,
        message_id: &str,
        reader_id: &str,
    ) -> Result<(), InboxError> {
        self.messages.mark_read(message_id, reader_id).await?;
        Ok(())
    }

    async fn publish_lossy(&self, event: ChangeEvent) {
        if let Err(e) = self.feed.publish(event).await {
            warn!(error = %e, "Change event publish failed, consumers will catch up on reload");
        }
    }
}
