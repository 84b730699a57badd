//! 远端存储客户端
//!
//! 远端只是一个读写契约：拉取某用户的全部记录，按 (user_id, title_id) upsert / 删除。
//! 冲突解决全部在客户端完成，远端不做合并。

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::{Bookmark, ReadingProgress};

pub mod http;
pub mod memory;
pub mod rows;

pub use http::HttpRemoteStore;
pub use memory::InMemoryRemoteStore;

/// 远端存储契约
///
/// 所有操作要么完整生效要么失败，不允许部分写入。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>>;

    async fn fetch_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>>;

    async fn upsert_bookmark(&self, uid: &str, bookmark: &Bookmark) -> Result<()>;

    async fn delete_bookmark(&self, uid: &str, title_id: &str) -> Result<()>;

    /// 以 (user_id, title_id) 为唯一键 upsert，重复调用不会产生重复行
    async fn upsert_progress(&self, uid: &str, progress: &ReadingProgress) -> Result<()>;

    /// 清空该用户的全部阅读进度
    async fn delete_all_progress(&self, uid: &str) -> Result<()>;
}
