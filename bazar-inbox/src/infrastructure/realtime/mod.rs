//! 变更流实现：进程内广播与 Redis pub/sub 桥接

pub mod local;
pub mod redis_feed;

pub use local::{DEFAULT_FEED_BUFFER, LocalChangeFeed};
pub use redis_feed::{DEFAULT_CHANGE_CHANNEL, RedisChangeFeed};
