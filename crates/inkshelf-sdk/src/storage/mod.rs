//! 存储模块 - 本地副本的数据持久化层
//!
//! 分层：
//! - KvStore: sled 之上的用户隔离键值存储
//! - LocalStore: 书架 / 阅读进度 / 同步游标的持久化契约
//! - Entities: 数据实体定义

pub mod entities;
pub mod kv;
pub mod local_store;
pub mod memory;

pub use entities::{clamp_percent, Bookmark, ReadingProgress};
pub use kv::KvStore;
pub use local_store::{KvLocalStore, LocalStore};
pub use memory::InMemoryLocalStore;
