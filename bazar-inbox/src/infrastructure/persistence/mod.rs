//! 存储实现：PostgreSQL 与内存后端

pub mod memory;
pub mod postgres;

pub use memory::{MemoryInboxStore, MemoryListingStore, MemoryProfileStore};
pub use postgres::{
    PostgresInboxStore, PostgresListingStore, PostgresProfileStore,
};
