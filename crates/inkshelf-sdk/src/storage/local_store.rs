//! 本地副本 - 书架与阅读进度的持久化契约
//!
//! 本地副本永远可写；损坏的数据按空集合处理，等待下一次成功拉取自愈。

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use super::entities::{Bookmark, ReadingProgress};
use super::kv::{keys, KvStore};
use crate::error::{InkshelfSDKError, Result};
use crate::sync::{EntityType, SyncCursorStore};
use crate::version::LOCAL_SCHEMA_VERSION;

/// 本地存储契约
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>>;

    async fn save_bookmarks(&self, uid: &str, bookmarks: &[Bookmark]) -> Result<()>;

    async fn load_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>>;

    async fn save_progress(&self, uid: &str, progress: &[ReadingProgress]) -> Result<()>;

    async fn get_last_sync_at(&self, uid: &str) -> Result<Option<i64>>;

    async fn set_last_sync_at(&self, uid: &str, timestamp_ms: i64) -> Result<()>;

    /// 远端删除失败、尚待重试的书签 title_id
    async fn load_pending_deletes(&self, uid: &str) -> Result<Vec<String>>;

    async fn save_pending_deletes(&self, uid: &str, title_ids: &[String]) -> Result<()>;
}

/// 基于 sled KV 的本地存储
pub struct KvLocalStore {
    kv: Arc<KvStore>,
    cursors: SyncCursorStore,
}

impl KvLocalStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        let cursors = SyncCursorStore::new(kv.clone());
        Self { kv, cursors }
    }

    pub fn kv(&self) -> &Arc<KvStore> {
        &self.kv
    }

    /// 检查并写入本地持久化格式版本
    ///
    /// 本地版本高于当前 SDK 时拒绝打开。
    pub async fn ensure_schema(&self, uid: &str) -> Result<()> {
        let stored: Option<u32> = self
            .kv
            .get(uid, keys::SCHEMA_VERSION)
            .await
            .unwrap_or_else(|e| {
                warn!("本地格式版本无法解析，按未初始化处理: {}", e);
                None
            });
        match stored {
            Some(v) if v > LOCAL_SCHEMA_VERSION => Err(InkshelfSDKError::Config(format!(
                "本地数据格式版本 {} 高于 SDK 支持的 {}",
                v, LOCAL_SCHEMA_VERSION
            ))),
            Some(v) if v == LOCAL_SCHEMA_VERSION => Ok(()),
            _ => {
                info!("初始化用户 {} 的本地数据格式版本: {}", uid, LOCAL_SCHEMA_VERSION);
                self.kv.set(uid, keys::SCHEMA_VERSION, &LOCAL_SCHEMA_VERSION).await
            }
        }
    }

    async fn load_collection<T>(&self, uid: &str, entity_type: EntityType) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        match self.kv.get::<_, Vec<T>>(uid, entity_type.storage_key()).await {
            Ok(Some(items)) => Ok(items),
            Ok(None) => Ok(Vec::new()),
            Err(InkshelfSDKError::Serialization(e)) => {
                warn!(
                    "⚠️ 本地 {} 数据损坏，按空集合处理，等待下次同步自愈: {}",
                    entity_type, e
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn save_collection<T>(&self, uid: &str, entity_type: EntityType, items: &[T]) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.kv.set(uid, entity_type.storage_key(), &items).await?;
        self.kv.flush().await
    }
}

#[async_trait]
impl LocalStore for KvLocalStore {
    async fn load_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>> {
        self.load_collection(uid, EntityType::Bookmark).await
    }

    async fn save_bookmarks(&self, uid: &str, bookmarks: &[Bookmark]) -> Result<()> {
        self.save_collection(uid, EntityType::Bookmark, bookmarks).await
    }

    async fn load_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>> {
        self.load_collection(uid, EntityType::ReadingProgress).await
    }

    async fn save_progress(&self, uid: &str, progress: &[ReadingProgress]) -> Result<()> {
        self.save_collection(uid, EntityType::ReadingProgress, progress).await
    }

    async fn get_last_sync_at(&self, uid: &str) -> Result<Option<i64>> {
        match self.cursors.last_sync_at(uid).await {
            Err(InkshelfSDKError::Serialization(e)) => {
                warn!("同步游标损坏，视为从未同步: {}", e);
                Ok(None)
            }
            other => other,
        }
    }

    async fn set_last_sync_at(&self, uid: &str, timestamp_ms: i64) -> Result<()> {
        self.cursors.set_last_sync_at(uid, timestamp_ms).await
    }

    async fn load_pending_deletes(&self, uid: &str) -> Result<Vec<String>> {
        match self.kv.get(uid, keys::PENDING_BOOKMARK_DELETES).await {
            Ok(ids) => Ok(ids.unwrap_or_default()),
            Err(InkshelfSDKError::Serialization(e)) => {
                warn!("待删除书签列表损坏，按空处理: {}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn save_pending_deletes(&self, uid: &str, title_ids: &[String]) -> Result<()> {
        if title_ids.is_empty() {
            self.kv.delete(uid, keys::PENDING_BOOKMARK_DELETES).await?;
        } else {
            self.kv.set(uid, keys::PENDING_BOOKMARK_DELETES, &title_ids).await?;
        }
        self.kv.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> KvLocalStore {
        let kv = Arc::new(KvStore::new(dir.path()).await.unwrap());
        KvLocalStore::new(kv)
    }

    #[tokio::test]
    async fn collections_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let bookmarks = vec![Bookmark::new("solo-leveling", "Solo Leveling", 10)];
        store.save_bookmarks("u1", &bookmarks).await.unwrap();
        assert_eq!(store.load_bookmarks("u1").await.unwrap(), bookmarks);

        let mut progress = ReadingProgress::new("solo-leveling", 20);
        progress.raise_chapter_percent("3", 55);
        store.save_progress("u1", &[progress.clone()]).await.unwrap();
        assert_eq!(store.load_progress("u1").await.unwrap(), vec![progress]);

        assert!(store.load_bookmarks("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_collection_loads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store
            .kv()
            .set_raw("u1", keys::BOOKMARKS, b"[{\"titleId\":".to_vec())
            .await
            .unwrap();
        assert!(store.load_bookmarks("u1").await.unwrap().is_empty());

        store
            .kv()
            .set_raw("u1", keys::READING_PROGRESS, b"null-ish".to_vec())
            .await
            .unwrap();
        assert!(store.load_progress("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_sync_at_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        assert_eq!(store.get_last_sync_at("u1").await.unwrap(), None);
        store.set_last_sync_at("u1", 1_234).await.unwrap();
        assert_eq!(store.get_last_sync_at("u1").await.unwrap(), Some(1_234));
    }

    #[tokio::test]
    async fn pending_deletes_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(&temp_dir).await;
            assert!(store.load_pending_deletes("u1").await.unwrap().is_empty());
            store
                .save_pending_deletes("u1", &["a".to_string(), "b".to_string()])
                .await
                .unwrap();
        }
        let store = open_store(&temp_dir).await;
        assert_eq!(store.load_pending_deletes("u1").await.unwrap(), vec!["a", "b"]);

        store.save_pending_deletes("u1", &[]).await.unwrap();
        assert!(!store.kv().exists("u1", keys::PENDING_BOOKMARK_DELETES).await.unwrap());
    }

    #[tokio::test]
    async fn newer_schema_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.ensure_schema("u1").await.unwrap();
        store.ensure_schema("u1").await.unwrap();

        store
            .kv()
            .set("u1", keys::SCHEMA_VERSION, &(LOCAL_SCHEMA_VERSION + 1))
            .await
            .unwrap();
        assert!(matches!(
            store.ensure_schema("u1").await,
            Err(InkshelfSDKError::Config(_))
        ));
    }
}
