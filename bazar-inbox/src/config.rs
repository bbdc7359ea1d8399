//! 收件箱子系统配置
//!
//! 从应用配置解析实例引用，环境变量（INBOX_*）可逐项覆盖。

use anyhow::{Result, bail};
use std::env;

use bazar_chat_core::config::{BazarAppConfig, PostgresInstanceConfig, RedisPoolConfig};

use crate::domain::model::InboxDomainConfig;
use crate::infrastructure::realtime::{DEFAULT_CHANGE_CHANNEL, DEFAULT_FEED_BUFFER};

const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// 收件箱子系统的运行配置
#[derive(Clone, Debug)]
pub struct InboxConfig {
    /// "memory" 或 "postgres"
    pub backend: String,
    /// backend = "postgres" 时解析出的实例配置
    pub postgres: Option<PostgresInstanceConfig>,
    /// "local" 或 "redis"
    pub feed: String,
    /// feed = "redis" 时解析出的实例配置
    pub redis: Option<RedisPoolConfig>,
    pub feed_buffer: usize,
    pub change_channel: String,
    pub history_limit: i64,
}

impl InboxConfig {
    /// 从应用配置加载
    pub fn from_app_config(app: &BazarAppConfig) -> Result<Self> {
        let service_config = app.inbox();

        let backend = env::var("INBOX_BACKEND")
            .ok()
            .or_else(|| service_config.backend.clone())
            .unwrap_or_else(|| "memory".to_string());
        if backend != "memory" && backend != "postgres" {
            bail!("INBOX_BACKEND must be \"memory\" or \"postgres\", got {backend:?}");
        }

        let postgres = match backend.as_str() {
            "postgres" => {
                let from_env = env::var("INBOX_POSTGRES_URL").ok().map(|url| {
                    PostgresInstanceConfig {
                        url,
                        max_connections: None,
                        acquire_timeout_secs: None,
                    }
                });
                let resolved = from_env.or_else(|| {
                    let instance = service_config
                        .postgres_instance
                        .as_deref()
                        .unwrap_or("primary");
                    app.postgres_profile(instance).cloned()
                });
                match resolved {
                    Some(config) => Some(config),
                    None => bail!("postgres backend selected but no postgres instance resolved"),
                }
            }
            _ => None,
        };

        let feed = env::var("INBOX_FEED")
            .ok()
            .or_else(|| service_config.feed.clone())
            .unwrap_or_else(|| "local".to_string());
        if feed != "local" && feed != "redis" {
            bail!("INBOX_FEED must be \"local\" or \"redis\", got {feed:?}");
        }

        let redis = match feed.as_str() {
            "redis" => {
                let from_env = env::var("INBOX_REDIS_URL").ok().map(|url| RedisPoolConfig {
                    url,
                    response_timeout_secs: None,
                });
                let resolved = from_env.or_else(|| {
                    let instance = service_config
                        .redis_instance
                        .as_deref()
                        .unwrap_or("realtime");
                    app.redis_profile(instance).cloned()
                });
                match resolved {
                    Some(config) => Some(config),
                    None => bail!("redis feed selected but no redis instance resolved"),
                }
            }
            _ => None,
        };

        let feed_buffer = env::var("INBOX_FEED_BUFFER")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .or(service_config.feed_buffer)
            .unwrap_or(DEFAULT_FEED_BUFFER);

        let change_channel = env::var("INBOX_CHANGE_CHANNEL")
            .ok()
            .unwrap_or_else(|| DEFAULT_CHANGE_CHANNEL.to_string());

        let history_limit = env::var("INBOX_HISTORY_LIMIT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .or(service_config.history_limit)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        if history_limit <= 0 {
            bail!("history_limit must be positive, got {history_limit}");
        }

        Ok(Self {
            backend,
            postgres,
            feed,
            redis,
            feed_buffer,
            change_channel,
            history_limit,
        })
    }

    /// 领域服务需要的配置切片
    pub fn domain_config(&self) -> InboxDomainConfig {
        InboxDomainConfig {
            history_limit: self.history_limit,
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            postgres: None,
            feed: "local".to_string(),
            redis: None,
            feed_buffer: DEFAULT_FEED_BUFFER,
            change_channel: DEFAULT_CHANGE_CHANNEL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}
