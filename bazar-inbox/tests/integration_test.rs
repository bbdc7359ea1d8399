// 集成测试套件 - 覆盖收件箱的目录、通道与未读三条主链路
// 全部使用 memory 后端 + 进程内变更流，不依赖外部服务
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use bazar_inbox::application::ConversationChannel;
use bazar_inbox::domain::model::{
    ChannelState, CounterpartProfile, InboxDomainConfig, ListingCard, Message, MessageDraft,
    PENDING_ID_PREFIX,
};
use bazar_inbox::domain::repository::{MessageStore, StoreResult};
use bazar_inbox::domain::service::InboxDomainService;
use bazar_inbox::error::{InboxError, StoreError};
use bazar_inbox::infrastructure::persistence::{
    MemoryInboxStore, MemoryListingStore, MemoryProfileStore,
};
use bazar_inbox::infrastructure::realtime::LocalChangeFeed;
use bazar_inbox::service::Inbox;

struct TestHarness {
    inbox: Inbox,
    store: Arc<MemoryInboxStore>,
    profiles: Arc<MemoryProfileStore>,
    listings: Arc<MemoryListingStore>,
}

fn build_inbox() -> TestHarness {
    build_inbox_with_config(InboxDomainConfig::default())
}

fn build_inbox_with_config(config: InboxDomainConfig) -> TestHarness {
    bazar_chat_core::tracing::try_init_for_tests();
    let store = Arc::new(MemoryInboxStore::new());
    let profiles = Arc::new(MemoryProfileStore::new());
    let listings = Arc::new(MemoryListingStore::new());
    let service = Arc::new(InboxDomainService::new(
        store.clone(),
        store.clone(),
        profiles.clone(),
        listings.clone(),
        Arc::new(LocalChangeFeed::new(64)),
        config,
    ));
    TestHarness {
        inbox: Inbox::new(service),
        store,
        profiles,
        listings,
    }
}

/// 可注入插入失败的消息存储，用于验证乐观发送的回滚路径
struct FlakyMessageStore {
    inner: Arc<MemoryInboxStore>,
    fail_inserts: AtomicBool,
}

impl FlakyMessageStore {
    fn new(inner: Arc<MemoryInboxStore>) -> Self {
        Self {
            inner,
            fail_inserts: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail_inserts.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStore for FlakyMessageStore {
    async fn insert(&self, draft: &MessageDraft) -> StoreResult<Message> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected insert failure"
            )));
        }
        self.inner.insert(draft).await
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<Message>> {
        self.inner.list_for_conversation(conversation_id, limit).await
    }

    async fn latest_for_conversation(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<Message>> {
        self.inner.latest_for_conversation(conversation_id).await
    }

    async fn count_unread(&self, conversation_id: &str, actor_id: &str) -> StoreResult<i64> {
        self.inner.count_unread(conversation_id, actor_id).await
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> StoreResult<u64> {
        self.inner
            .mark_conversation_read(conversation_id, reader_id)
            .await
    }

    async fn mark_read(&self, message_id: &str, reader_id: &str) -> StoreResult<()> {
        self.inner.mark_read(message_id, reader_id).await
    }
}

// ==================== 会话打开与去重 ====================

#[tokio::test]
async fn test_concurrent_open_or_create_converges() -> Result<()> {
    let harness = build_inbox();
    let service = harness.inbox.domain_service();

    // 双方同时发起，唯一索引保证只落一条
    let (a, b) = tokio::join!(
        service.open_or_create_conversation("alice", "bob", Some("listing-1")),
        service.open_or_create_conversation("bob", "alice", Some("listing-1")),
    );
    let a = a?;
    let b = b?;
    assert_eq!(a.id, b.id);

    // 不同商品上下文是另一条会话
    let c = service
        .open_or_create_conversation("alice", "bob", Some("listing-2"))
        .await?;
    assert_ne!(c.id, a.id);

    // 无商品上下文同样独立，且重复打开命中同一条
    let d = service
        .open_or_create_conversation("alice", "bob", None)
        .await?;
    let e = service
        .open_or_create_conversation("bob", "alice", None)
        .await?;
    assert_ne!(d.id, a.id);
    assert_ne!(d.id, c.id);
    assert_eq!(d.id, e.id);

    Ok(())
}

#[tokio::test]
async fn test_self_conversation_rejected() -> Result<()> {
    let harness = build_inbox();
    let service = harness.inbox.domain_service();
    let result = service
        .open_or_create_conversation("alice", "alice", None)
        .await;
    assert!(matches!(result, Err(InboxError::SelfConversation)));
    Ok(())
}

#[tokio::test]
async fn test_foreign_conversation_denied() -> Result<()> {
    let harness = build_inbox();
    let conversation = harness
        .inbox
        .domain_service()
        .open_or_create_conversation("alice", "bob", None)
        .await?;
    let result = harness
        .inbox
        .open_channel_by_id(&conversation.id, "mallory")
        .await;
    assert!(matches!(result, Err(InboxError::ConversationNotFound(_))));
    Ok(())
}

// ==================== 通道生命周期与乐观发送 ====================

#[tokio::test]
async fn test_channel_requires_load_before_send() -> Result<()> {
    let harness = build_inbox();
    let service = harness.inbox.domain_service();
    let conversation = service
        .open_or_create_conversation("alice", "bob", None)
        .await?;

    let mut channel = ConversationChannel::open(service.clone(), conversation, "alice");
    assert_eq!(channel.state(), ChannelState::Idle);

    let result = channel.send_message("too early").await;
    assert!(matches!(result, Err(InboxError::ChannelNotReady)));

    channel.load().await?;
    assert_eq!(channel.state(), ChannelState::Ready);
    channel.send_message("now fine").await?;
    Ok(())
}

#[tokio::test]
async fn test_optimistic_send_persists_and_survives_reload() -> Result<()> {
    let harness = build_inbox();
    let mut channel = harness.inbox.open_channel("alice", "bob", None).await?;
    assert_eq!(channel.state(), ChannelState::Ready);
    assert!(channel.messages().is_empty());

    let sent = channel.send_message("first").await?;
    assert!(!sent.id.starts_with(PENDING_ID_PREFIX));
    assert_eq!(channel.messages().len(), 1);
    assert_eq!(channel.messages()[0].id, sent.id);

    // 重开通道后历史仍在
    let reopened = harness.inbox.open_channel("alice", "bob", None).await?;
    assert_eq!(reopened.messages().len(), 1);
    assert_eq!(reopened.messages()[0].id, sent.id);
    Ok(())
}

#[tokio::test]
async fn test_failed_send_rolls_back_provisional() -> Result<()> {
    bazar_chat_core::tracing::try_init_for_tests();
    let store = Arc::new(MemoryInboxStore::new());
    let flaky = Arc::new(FlakyMessageStore::new(store.clone()));
    let service = Arc::new(InboxDomainService::new(
        store.clone(),
        flaky.clone(),
        Arc::new(MemoryProfileStore::new()),
        Arc::new(MemoryListingStore::new()),
        Arc::new(LocalChangeFeed::new(64)),
        InboxDomainConfig::default(),
    ));
    let inbox = Inbox::new(service);

    let mut channel = inbox.open_channel("alice", "bob", None).await?;
    channel.send_message("survives").await?;
    let before: Vec<String> = channel.messages().iter().map(|m| m.id.clone()).collect();

    flaky.set_failing(true);
    let err = channel.send_message("doomed").await.unwrap_err();
    assert!(err.is_retryable());

    // 时间线与失败前完全一致，通道依旧可用
    let after: Vec<String> = channel.messages().iter().map(|m| m.id.clone()).collect();
    assert_eq!(before, after);
    assert_eq!(channel.state(), ChannelState::Ready);

    flaky.set_failing(false);
    channel.send_message("retry succeeds").await?;
    assert_eq!(channel.messages().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_draft_rejected_without_side_effects() -> Result<()> {
    let harness = build_inbox();
    let mut channel = harness.inbox.open_channel("alice", "bob", None).await?;

    let err = channel.send_message("   ").await.unwrap_err();
    assert!(matches!(err, InboxError::EmptyMessage));
    assert!(channel.messages().is_empty());
    assert_eq!(channel.state(), ChannelState::Ready);
    Ok(())
}

// ==================== 实时收敛 ====================

#[tokio::test]
async fn test_own_echo_not_duplicated() -> Result<()> {
    let harness = build_inbox();
    let mut channel = harness.inbox.open_channel("alice", "bob", None).await?;

    channel.send_message("hello").await?;
    // 自己的插入事件回到订阅缓冲，按 ID 收敛后时间线不变
    let applied = channel.poll_events();
    assert!(applied >= 1);
    assert_eq!(channel.messages().len(), 1);
    assert_eq!(channel.messages()[0].content, "hello");
    Ok(())
}

#[tokio::test]
async fn test_counterpart_receives_in_realtime() -> Result<()> {
    let harness = build_inbox();
    let mut alice = harness.inbox.open_channel("alice", "bob", None).await?;
    let conversation_id = alice.conversation().id.clone();
    let mut bob = harness
        .inbox
        .open_channel_by_id(&conversation_id, "bob")
        .await?;

    let sent = alice.send_message("ping").await?;
    let event = bob.next_event().await.expect("event should arrive");
    assert_eq!(event.conversation_id(), conversation_id);
    assert_eq!(bob.messages().len(), 1);
    assert_eq!(bob.messages()[0].id, sent.id);
    // 正在看会话，收到即已读
    assert!(bob.messages()[0].read);

    // 后台单条置已读落库
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.store.count_unread(&conversation_id, "bob").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_history_load_marks_read_and_receipt_fans_out() -> Result<()> {
    let harness = build_inbox();
    let mut alice = harness.inbox.open_channel("alice", "bob", None).await?;
    let conversation_id = alice.conversation().id.clone();
    alice.send_message("one").await?;
    alice.send_message("two").await?;
    assert_eq!(harness.store.count_unread(&conversation_id, "bob").await?, 2);

    // 接收方打开会话即批量置已读
    let bob = harness
        .inbox
        .open_channel_by_id(&conversation_id, "bob")
        .await?;
    assert_eq!(harness.store.count_unread(&conversation_id, "bob").await?, 0);
    assert!(bob.messages().iter().all(|m| m.read));

    // 发送方通过回执同步已读状态
    let applied = alice.poll_events();
    assert!(applied >= 1);
    assert!(alice.messages().iter().all(|m| m.read));

    // 已读单调，再次加载不回退
    let reopened = harness
        .inbox
        .open_channel_by_id(&conversation_id, "bob")
        .await?;
    assert!(reopened.messages().iter().all(|m| m.read));
    Ok(())
}

#[tokio::test]
async fn test_channel_close_releases_subscription() -> Result<()> {
    let harness = build_inbox();
    let mut alice = harness.inbox.open_channel("alice", "bob", None).await?;
    let conversation_id = alice.conversation().id.clone();
    let bob = harness
        .inbox
        .open_channel_by_id(&conversation_id, "bob")
        .await?;

    bob.close();
    // 一端关闭后另一端不受影响
    alice.send_message("after close").await?;
    assert!(alice.poll_events() >= 1);
    assert_eq!(alice.messages().len(), 1);
    Ok(())
}

// ==================== 历史窗口 ====================

#[tokio::test]
async fn test_history_window_keeps_most_recent() -> Result<()> {
    let harness = build_inbox_with_config(InboxDomainConfig { history_limit: 2 });
    let mut channel = harness.inbox.open_channel("alice", "bob", None).await?;
    for i in 0..4 {
        channel.send_message(&format!("m{}", i)).await?;
    }

    let reopened = harness.inbox.open_channel("alice", "bob", None).await?;
    let contents: Vec<&str> = reopened
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    // 只保留最近两条，且仍为升序
    assert_eq!(contents, vec!["m2", "m3"]);
    Ok(())
}

// ==================== 目录与未读 ====================

#[tokio::test]
async fn test_directory_rows_enriched_and_sorted() -> Result<()> {
    let harness = build_inbox();
    harness.profiles.put_profile(CounterpartProfile {
        user_id: "bob".to_string(),
        display_name: "Bob".to_string(),
        avatar_url: None,
    });
    harness.listings.put_listing(ListingCard {
        listing_id: "listing-1".to_string(),
        title: "Old chair".to_string(),
        price_cents: 4500,
        currency: "EUR".to_string(),
        image_url: None,
    });

    let mut first = harness
        .inbox
        .open_channel("alice", "bob", Some("listing-1"))
        .await?;
    first.send_message("about the chair").await?;
    // carol 没有资料，目录行降级为占位而不是消失
    let mut second = harness.inbox.open_channel("alice", "carol", None).await?;
    second.send_message("hi carol").await?;

    let mut directory = harness.inbox.directory("alice");
    let rows = directory.refresh().await?;
    assert_eq!(rows.len(), 2);
    // 最近活动在前
    assert_eq!(rows[0].conversation.id, second.conversation().id);
    assert_eq!(rows[0].counterpart.display_name, "Unknown user");
    assert_eq!(rows[1].counterpart.display_name, "Bob");
    assert_eq!(
        rows[1].listing.as_ref().map(|card| card.title.as_str()),
        Some("Old chair")
    );
    assert_eq!(
        rows[1]
            .latest_message
            .as_ref()
            .map(|message| message.content.as_str()),
        Some("about the chair")
    );
    // 都是 alice 自己发的，未读为 0
    assert_eq!(rows[1].unread_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_directory_sees_new_activity() -> Result<()> {
    let harness = build_inbox();
    let mut alice = harness.inbox.open_channel("alice", "bob", None).await?;

    let mut bob_directory = harness.inbox.directory("bob");
    bob_directory.refresh().await?;
    assert_eq!(bob_directory.take_pending_changes(), 0);

    alice.send_message("fresh activity").await?;
    assert!(bob_directory.take_pending_changes() >= 1);
    Ok(())
}

#[tokio::test]
async fn test_unread_badge_drops_per_conversation() -> Result<()> {
    let harness = build_inbox();
    let mut bob_first = harness
        .inbox
        .open_channel("bob", "alice", Some("listing-1"))
        .await?;
    bob_first.send_message("offer one").await?;
    bob_first.send_message("offer two").await?;
    let mut bob_second = harness.inbox.open_channel("bob", "alice", None).await?;
    bob_second.send_message("hello there").await?;

    let badge = harness.inbox.unread_badge();
    assert_eq!(badge.refresh(Some("alice")).await?, 3);
    assert_eq!(badge.cached(), 3);

    // 打开第一条会话，只清掉它的未读
    let first_id = bob_first.conversation().id.clone();
    let _alice_first = harness
        .inbox
        .open_channel_by_id(&first_id, "alice")
        .await?;
    assert_eq!(badge.refresh(Some("alice")).await?, 1);

    // 未登录恒为 0
    assert_eq!(badge.refresh(None).await?, 0);
    assert_eq!(badge.cached(), 0);
    Ok(())
}
