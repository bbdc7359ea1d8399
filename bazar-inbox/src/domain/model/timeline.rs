//! 消息时间线聚合
//!
//! 通道本地的消息序列，承载乐观发送协议的三个动作：
//! 临时插入、原位确认、失败回滚。所有来自变更流的消息
//! 一律通过 `upsert` 按 ID 收敛，天然去重。

use super::Message;

/// upsert 的结果：新增还是原位更新
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// 按插入顺序维护的会话消息序列
#[derive(Debug, Clone, Default)]
pub struct MessageTimeline {
    entries: Vec<Message>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== 查询方法 ====================

    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.iter().any(|m| m.id == message_id)
    }

    pub fn latest(&self) -> Option<&Message> {
        self.entries.last()
    }

    // ==================== 命令方法 ====================

    /// 历史加载完成后整体替换
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.entries = messages;
    }

    /// 乐观插入：临时消息追加到尾部
    pub fn append_provisional(&mut self, message: Message) {
        debug_assert!(message.is_provisional());
        self.entries.push(message);
    }

    /// 持久化成功后原位替换临时消息，位置保持不变
    ///
    /// 临时条目已不存在时返回 false（说明期间发生过整体重载）。
    pub fn confirm(&mut self, temp_id: &str, persisted: Message) -> bool {
        match self.entries.iter_mut().find(|m| m.id == temp_id) {
            Some(slot) => {
                *slot = persisted;
                true
            }
            None => false,
        }
    }

    /// 回滚：按 ID 移除一条消息，其余顺序不变
    pub fn remove(&mut self, message_id: &str) -> Option<Message> {
        let index = self.entries.iter().position(|m| m.id == message_id)?;
        Some(self.entries.remove(index))
    }

    /// 按 ID 收敛一条消息：已知 ID 原位更新，未知 ID 追加
    ///
    /// 变更流消息（包括自己的回声）只走这一条路径，at-least-once
    /// 投递的重复事件因此不会产生重复条目。
    pub fn upsert(&mut self, message: Message) -> UpsertOutcome {
        match self.entries.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message;
                UpsertOutcome::Updated
            }
            None => {
                self.entries.push(message);
                UpsertOutcome::Inserted
            }
        }
    }

    /// 对方已读回执：把 `reader_id` 之外的发送者的消息置为已读
    ///
    /// 只有 false -> true 一个方向，返回翻转的条数。
    pub fn mark_read_by(&mut self, reader_id: &str) -> usize {
        let mut flipped = 0;
        for message in &mut self.entries {
            if message.sender_id != reader_id && !message.read {
                message.read = true;
                flipped += 1;
            }
        }
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Message, MessageDraft};
    use super::*;

    fn persisted(id: &str, sender: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: sender.to_string(),
            content: content.to_string(),
            listing_id: None,
            read: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn provisional(sender: &str, content: &str) -> Message {
        let draft = MessageDraft::new("c1", sender, content, None).unwrap();
        Message::provisional(&draft)
    }

    #[test]
    fn test_confirm_replaces_in_place() {
        let mut timeline = MessageTimeline::new();
        timeline.replace_all(vec![persisted("m1", "bob", "one")]);

        let pending = provisional("alice", "two");
        let temp_id = pending.id.clone();
        timeline.append_provisional(pending);

        // 确认前又到了一条对方消息
        timeline.upsert(persisted("m3", "bob", "three"));

        let confirmed = persisted("m2", "alice", "two");
        assert!(timeline.confirm(&temp_id, confirmed));

        let ids: Vec<&str> = timeline.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_rollback_restores_previous_sequence() {
        let mut timeline = MessageTimeline::new();
        timeline.replace_all(vec![persisted("m1", "bob", "one")]);
        let before: Vec<String> = timeline.messages().iter().map(|m| m.id.clone()).collect();

        let pending = provisional("alice", "doomed");
        let temp_id = pending.id.clone();
        timeline.append_provisional(pending);
        assert!(timeline.remove(&temp_id).is_some());

        let after: Vec<String> = timeline.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_upsert_deduplicates_echo() {
        let mut timeline = MessageTimeline::new();
        let message = persisted("m1", "alice", "hi");
        assert_eq!(timeline.upsert(message.clone()), UpsertOutcome::Inserted);
        assert_eq!(timeline.upsert(message), UpsertOutcome::Updated);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_confirm_missing_temp_id_reports_false() {
        let mut timeline = MessageTimeline::new();
        assert!(!timeline.confirm("pending-unknown", persisted("m1", "alice", "hi")));
    }

    #[test]
    fn test_mark_read_by_is_monotonic_and_spares_reader_messages() {
        let mut timeline = MessageTimeline::new();
        timeline.replace_all(vec![
            persisted("m1", "alice", "mine"),
            persisted("m2", "bob", "theirs"),
        ]);

        // bob 读：alice 的消息翻转，bob 的不动
        assert_eq!(timeline.mark_read_by("bob"), 1);
        assert!(timeline.messages()[0].read);
        assert!(!timeline.messages()[1].read);

        // 重复回执不再翻转任何条目
        assert_eq!(timeline.mark_read_by("bob"), 0);
        assert!(timeline.messages()[0].read);
    }
}
