//! 会话通道
//!
//! 单个打开的会话：历史加载、乐观发送、实时接收与已读维护。
//! 通道持有自己的变更流订阅（先订阅后加载，事件不会落在缝隙里），
//! 句柄 drop 即退订。

use std::sync::Arc;

use tracing::{debug, warn};

use bazar_chat_core::metrics::INBOX_METRICS;

use crate::domain::event::ChangeEvent;
use crate::domain::model::{
    ChannelState, Conversation, Message, MessageDraft, MessageTimeline, UpsertOutcome,
};
use crate::domain::repository::FeedSubscription;
use crate::domain::service::InboxDomainService;
use crate::error::InboxError;

/// 打开的会话通道
pub struct ConversationChannel {
    conversation: Conversation,
    actor_id: String,
    service: Arc<InboxDomainService>,
    subscription: FeedSubscription,
    timeline: MessageTimeline,
    state: ChannelState,
}

impl ConversationChannel {
    /// 建立通道：先订阅变更流，此时不触发任何存储访问
    pub fn open(
        service: Arc<InboxDomainService>,
        conversation: Conversation,
        actor_id: &str,
    ) -> Self {
        let subscription = service.feed().subscribe_conversation(&conversation.id);
        Self {
            conversation,
            actor_id: actor_id.to_string(),
            service,
            subscription,
            timeline: MessageTimeline::new(),
            state: ChannelState::Idle,
        }
    }

    // ==================== 查询方法 ====================

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    // ==================== 生命周期 ====================

    /// 加载（或重新加载）历史并批量置已读
    ///
    /// 失败进入 Failed，再次调用即为重试。
    pub async fn load(&mut self) -> Result<(), InboxError> {
        self.state = ChannelState::Loading;
        match self
            .service
            .load_history(&self.conversation.id, &self.actor_id)
            .await
        {
            Ok((messages, _flipped)) => {
                self.timeline.replace_all(messages);
                self.state = ChannelState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(
                    conversation_id = %self.conversation.id,
                    error = %e,
                    "History load failed"
                );
                self.state = ChannelState::Failed;
                Err(e)
            }
        }
    }

    /// 显式关闭；等价于 drop（订阅随句柄释放）
    pub fn close(self) {}

    // ==================== 发送 ====================

    /// 乐观发送
    ///
    /// 1. 本地校验草稿，空正文立即报错，不触碰网络；
    /// 2. 临时消息即时上屏；
    /// 3. 持久化成功后原位替换为真实消息；
    /// 4. 失败则移除临时消息，时间线恢复原样，错误交给调用方。
    pub async fn send_message(&mut self, content: &str) -> Result<Message, InboxError> {
        if self.state != ChannelState::Ready {
            return Err(InboxError::ChannelNotReady);
        }

        let draft = match MessageDraft::new(
            &self.conversation.id,
            &self.actor_id,
            content,
            self.conversation.listing_id.clone(),
        ) {
            Ok(draft) => draft,
            Err(e) => {
                INBOX_METRICS
                    .messages_sent_total
                    .with_label_values(&["rejected"])
                    .inc();
                return Err(e);
            }
        };

        let provisional = Message::provisional(&draft);
        let temp_id = provisional.id.clone();
        self.timeline.append_provisional(provisional);
        self.state = ChannelState::Sending;

        match self.service.deliver_message(&draft).await {
            Ok(persisted) => {
                if !self.timeline.confirm(&temp_id, persisted.clone()) {
                    // 发送期间发生过整体重载，临时条目已不在，按 ID 收敛兜底
                    self.timeline.upsert(persisted.clone());
                }
                self.state = ChannelState::Ready;
                INBOX_METRICS
                    .messages_sent_total
                    .with_label_values(&["persisted"])
                    .inc();
                Ok(persisted)
            }
            Err(e) => {
                self.timeline.remove(&temp_id);
                self.state = ChannelState::Ready;
                INBOX_METRICS
                    .messages_sent_total
                    .with_label_values(&["rolled_back"])
                    .inc();
                warn!(
                    conversation_id = %self.conversation.id,
                    error = %e,
                    "Send failed, provisional message rolled back"
                );
                Err(e)
            }
        }
    }

    // ==================== 实时接收 ====================

    /// 等待下一条本会话事件并收敛进时间线
    ///
    /// 返回应用后的事件；变更流关闭时返回 None。
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let event = self.subscription.recv().await?;
        self.apply(&event);
        Some(event)
    }

    /// 非阻塞排空缓冲中的事件，返回应用条数
    pub fn poll_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.subscription.try_recv() {
            self.apply(&event);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: &ChangeEvent) {
        INBOX_METRICS
            .realtime_events_total
            .with_label_values(&[event.kind()])
            .inc();
        match event {
            ChangeEvent::MessageInserted { message } => {
                let mut incoming = message.clone();
                let from_counterpart = incoming.sender_id != self.actor_id;
                if from_counterpart {
                    // 正在看这条会话，收到即已读
                    incoming.read = true;
                }
                let outcome = self.timeline.upsert(incoming);
                if from_counterpart && outcome == UpsertOutcome::Inserted {
                    self.spawn_mark_read(&message.id);
                }
                debug!(
                    conversation_id = %self.conversation.id,
                    message_id = %message.id,
                    outcome = ?outcome,
                    "Realtime message reconciled"
                );
            }
            ChangeEvent::ConversationRead { reader_id, .. } => {
                if reader_id != &self.actor_id {
                    let flipped = self.timeline.mark_read_by(reader_id);
                    debug!(
                        conversation_id = %self.conversation.id,
                        reader_id = %reader_id,
                        flipped,
                        "Read receipt applied"
                    );
                }
            }
        }
    }

    /// 实时收到对方消息后的置已读：后台执行，从不阻塞接收路径
    fn spawn_mark_read(&self, message_id: &str) {
        let service = Arc::clone(&self.service);
        let message_id = message_id.to_string();
        let reader_id = self.actor_id.clone();
        tokio::spawn(async move {
            if let Err(e) = service.mark_message_read(&message_id, &reader_id).await {
                // 失败只降级角标新鲜度，下一次历史加载会补齐
                warn!(message_id = %message_id, error = %e, "Deferred mark-read failed");
            }
        });
    }
}
