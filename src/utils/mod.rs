//! 工具函数模块
//!
//! 提供正文截断等通用工具函数

#[cfg(test)]
mod preview_tests;

/// 截断消息正文，用于目录预览与日志字段
///
/// 在字符边界截断，超长时追加省略号。正文本身永远不被修改，
/// 只有截断后的副本对外。
pub fn preview(content: &str, max_chars: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
