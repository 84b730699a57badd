//! 内存本地存储，不落盘，用于测试和临时会话

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::entities::{Bookmark, ReadingProgress};
use super::local_store::LocalStore;
use crate::error::Result;

#[derive(Debug, Default, Clone)]
struct UserData {
    bookmarks: Vec<Bookmark>,
    progress: Vec<ReadingProgress>,
    last_sync_at: Option<i64>,
    pending_deletes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    users: RwLock<HashMap<String, UserData>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, uid: &str, f: impl FnOnce(&UserData) -> T) -> T
    where
        T: Default,
    {
        self.users.read().get(uid).map(f).unwrap_or_default()
    }

    fn write(&self, uid: &str, f: impl FnOnce(&mut UserData)) {
        f(self.users.write().entry(uid.to_string()).or_default());
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn load_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>> {
        Ok(self.read(uid, |d| d.bookmarks.clone()))
    }

    async fn save_bookmarks(&self, uid: &str, bookmarks: &[Bookmark]) -> Result<()> {
        self.write(uid, |d| d.bookmarks = bookmarks.to_vec());
        Ok(())
    }

    async fn load_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>> {
        Ok(self.read(uid, |d| d.progress.clone()))
    }

    async fn save_progress(&self, uid: &str, progress: &[ReadingProgress]) -> Result<()> {
        self.write(uid, |d| d.progress = progress.to_vec());
        Ok(())
    }

    async fn get_last_sync_at(&self, uid: &str) -> Result<Option<i64>> {
        Ok(self.read(uid, |d| d.last_sync_at))
    }

    async fn set_last_sync_at(&self, uid: &str, timestamp_ms: i64) -> Result<()> {
        self.write(uid, |d| d.last_sync_at = Some(timestamp_ms));
        Ok(())
    }

    async fn load_pending_deletes(&self, uid: &str) -> Result<Vec<String>> {
        Ok(self.read(uid, |d| d.pending_deletes.clone()))
    }

    async fn save_pending_deletes(&self, uid: &str, title_ids: &[String]) -> Result<()> {
        self.write(uid, |d| d.pending_deletes = title_ids.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn users_do_not_share_collections() {
        let store = InMemoryLocalStore::new();
        store
            .save_bookmarks("u1", &[Bookmark::new("a", "A", 1)])
            .await
            .unwrap();
        store.set_last_sync_at("u1", 42).await.unwrap();

        assert_eq!(store.load_bookmarks("u1").await.unwrap().len(), 1);
        assert!(store.load_bookmarks("u2").await.unwrap().is_empty());
        assert_eq!(store.get_last_sync_at("u1").await.unwrap(), Some(42));
        assert_eq!(store.get_last_sync_at("u2").await.unwrap(), None);
    }
}
