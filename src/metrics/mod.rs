//! # Prometheus 指标收集模块
//!
//! 为收件箱子系统提供统一的 Prometheus 指标收集能力。

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 收件箱子系统指标
pub struct InboxMetrics {
    /// 消息发送结果计数（outcome: persisted / rolled_back / rejected）
    pub messages_sent_total: IntCounterVec,
    /// 实时事件消费计数（kind: message_inserted / conversation_read / lagged）
    pub realtime_events_total: IntCounterVec,
    /// 会话打开计数（path: created / existing）
    pub conversations_opened_total: IntCounterVec,
    /// 历史加载耗时（秒）
    pub history_load_duration_seconds: Histogram,
    /// 未读总数重算次数
    pub unread_recomputes_total: IntCounter,
}

impl InboxMetrics {
    pub fn new() -> Self {
        let messages_sent_total = IntCounterVec::new(
            Opts::new("messages_sent_total", "Total number of send attempts"),
            &["outcome"],
        )
        .expect("Failed to create messages_sent_total metric");

        let realtime_events_total = IntCounterVec::new(
            Opts::new(
                "realtime_events_total",
                "Total number of realtime change events consumed",
            ),
            &["kind"],
        )
        .expect("Failed to create realtime_events_total metric");

        let conversations_opened_total = IntCounterVec::new(
            Opts::new(
                "conversations_opened_total",
                "Total number of open-or-create resolutions",
            ),
            &["path"],
        )
        .expect("Failed to create conversations_opened_total metric");

        let history_load_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "history_load_duration_seconds",
                "History load duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("Failed to create history_load_duration_seconds metric");

        let unread_recomputes_total = IntCounter::new(
            "unread_recomputes_total",
            "Total number of unread badge recomputations",
        )
        .expect("Failed to create unread_recomputes_total metric");

        // 注册指标，忽略重复注册错误（测试中可能会重复创建）
        let _ = REGISTRY.register(Box::new(messages_sent_total.clone()));
        let _ = REGISTRY.register(Box::new(realtime_events_total.clone()));
        let _ = REGISTRY.register(Box::new(conversations_opened_total.clone()));
        let _ = REGISTRY.register(Box::new(history_load_duration_seconds.clone()));
        let _ = REGISTRY.register(Box::new(unread_recomputes_total.clone()));

        Self {
            messages_sent_total,
            realtime_events_total,
            conversations_opened_total,
            history_load_duration_seconds,
            unread_recomputes_total,
        }
    }
}

impl Default for InboxMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局收件箱指标实例
pub static INBOX_METRICS: Lazy<InboxMetrics> = Lazy::new(InboxMetrics::new);

/// 获取 Prometheus 指标导出格式
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8(buffer).unwrap_or_default(),
        Err(_) => String::new(),
    }
}
