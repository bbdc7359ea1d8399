//! 正文截断工具函数的单元测试

#[cfg(test)]
mod tests {
    use crate::utils::preview;

    #[test]
    fn test_preview_short_content_unchanged() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn test_preview_truncates_at_char_boundary() {
        assert_eq!(preview("hello world", 5), "hello...");

        // 多字节字符不会被劈开
        assert_eq!(preview("价格还能谈吗", 2), "价格...");
    }

    #[test]
    fn test_preview_exact_length_has_no_ellipsis() {
        assert_eq!(preview("abcde", 5), "abcde");
    }
}
