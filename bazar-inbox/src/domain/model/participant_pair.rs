//! ParticipantPair 值对象
//!
//! 1:1 会话参与者对的强类型封装：两个不同的用户 ID 按字典序排成
//! 规范形式，保证同一对用户无论谁发起都映射到同一个键。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 规范化的参与者对（low < high）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantPair {
    low: String,
    high: String,
}

impl ParticipantPair {
    /// 规范化构造：排序两个 ID，拒绝自会话与空 ID
    pub fn new(a: &str, b: &str) -> Result<Self, String> {
        if a.is_empty() || b.is_empty() {
            return Err("Participant id cannot be empty".to_string());
        }
        if a == b {
            return Err(format!("Participants must differ, got {a:?} twice"));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            low: low.to_string(),
            high: high.to_string(),
        })
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    /// 给定一侧，返回另一侧；不属于该对时返回 None
    pub fn counterpart_of(&self, actor: &str) -> Option<&str> {
        if actor == self.low {
            Some(&self.high)
        } else if actor == self.high {
            Some(&self.low)
        } else {
            None
        }
    }

    pub fn contains(&self, actor: &str) -> bool {
        actor == self.low || actor == self.high
    }
}

/// Display 输出 `low:high`，用于日志字段
impl fmt::Display for ParticipantPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
