//! Bazar Chat Core 公共库
//!
//! 为收件箱子系统提供统一的配置加载、日志初始化、指标收集和工具函数

pub mod config;
pub mod metrics;
pub mod tracing;
pub mod utils;

pub use config::{
    BazarAppConfig, InboxServiceConfig, LoggingConfig, PostgresInstanceConfig, RedisPoolConfig,
    app_config, load_config,
};
pub use utils::*;
