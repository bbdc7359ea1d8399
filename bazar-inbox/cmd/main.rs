use std::time::Duration;

use tracing::info;

use bazar_chat_core::load_config;
use bazar_chat_core::tracing::init_tracing_from_config;
use bazar_inbox::domain::model::{CounterpartProfile, ListingCard};
use bazar_inbox::service::wire;

/// 端到端演示：买家从商品页发起聊天，卖家在目录里看到未读、
/// 打开会话回复，买家通道实时收敛。默认配置走 memory 后端。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = load_config(None)?;
    init_tracing_from_config(Some(&app_config.logging));

    let context = wire::initialize(app_config).await?;
    let inbox = &context.inbox;

    // memory 后端：填充资料与商品数据，postgres 后端由外部表提供
    if let Some(seed) = &context.seed {
        seed.profiles.put_profile(CounterpartProfile {
            user_id: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
        });
        seed.profiles.put_profile(CounterpartProfile {
            user_id: "bob".to_string(),
            display_name: "Bob".to_string(),
            avatar_url: None,
        });
        seed.listings.put_listing(ListingCard {
            listing_id: "listing-001".to_string(),
            title: "City bike, barely used".to_string(),
            price_cents: 12000,
            currency: "EUR".to_string(),
            image_url: None,
        });
    }

    // 买家从商品页深链进入，乐观发送首条消息
    let mut alice_channel = inbox.open_channel("alice", "bob", Some("listing-001")).await?;
    let sent = alice_channel
        .send_message("Hi! Is the bike still available?")
        .await?;
    info!(message_id = %sent.id, "Buyer message persisted");

    // 卖家刷新目录，看到带未读数的会话行
    let mut directory = inbox.directory("bob");
    for summary in directory.refresh().await? {
        info!(
            conversation_id = %summary.conversation.id,
            counterpart = %summary.counterpart.display_name,
            listing = summary
                .listing
                .as_ref()
                .map(|card| card.title.as_str())
                .unwrap_or("-"),
            unread = summary.unread_count,
            preview = %summary.preview(32).unwrap_or_default(),
            "Directory row"
        );
    }

    let conversation_id = alice_channel.conversation().id.clone();

    // 卖家打开会话：历史加载即批量置已读，随后回复
    let mut bob_channel = inbox.open_channel_by_id(&conversation_id, "bob").await?;
    bob_channel
        .send_message("Yes, you can pick it up tonight.")
        .await?;

    // 买家通道收敛：回执把已发消息翻成已读，回复按 ID 并入
    let applied = alice_channel.poll_events();
    info!(
        applied,
        timeline_len = alice_channel.messages().len(),
        "Buyer timeline reconciled"
    );
    for message in alice_channel.messages() {
        info!(
            message_id = %message.id,
            sender_id = %message.sender_id,
            read = message.read,
            content = %message.content,
            "Timeline entry"
        );
    }

    // 买家收到回复后的置已读在后台执行，等它落库再看全局未读
    tokio::time::sleep(Duration::from_millis(50)).await;
    let badge = inbox.unread_badge();
    let alice_unread = badge.refresh(Some("alice")).await?;
    let bob_unread = badge.refresh(Some("bob")).await?;
    info!(alice_unread, bob_unread, "Unread totals");

    alice_channel.close();
    bob_channel.close();
    Ok(())
}
