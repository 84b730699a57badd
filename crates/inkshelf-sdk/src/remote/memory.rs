//! 内存远端存储
//!
//! 用于离线模式（未配置远端时）和测试。支持注入网络故障与延迟，
//! 并记录每类写操作的调用次数。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::RemoteStore;
use crate::error::{InkshelfSDKError, Result};
use crate::storage::{Bookmark, ReadingProgress};
use crate::sync::EntityType;

#[derive(Debug, Default, Clone)]
struct UserRows {
    bookmarks: BTreeMap<String, Bookmark>,
    progress: BTreeMap<String, ReadingProgress>,
}

#[derive(Debug, Default)]
struct FaultPlan {
    offline: bool,
    failing_fetches: HashSet<EntityType>,
    failing_writes: HashSet<EntityType>,
    latency: Option<Duration>,
}

/// 内存远端存储
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    users: Mutex<HashMap<String, UserRows>>,
    faults: Mutex<FaultPlan>,
    bookmark_upserts: AtomicUsize,
    bookmark_deletes: AtomicUsize,
    progress_upserts: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟完全断网：所有操作返回 Transport 错误
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().offline = offline;
    }

    /// 让某实体类型的拉取失败
    pub fn fail_fetch(&self, entity_type: EntityType, fail: bool) {
        let mut faults = self.faults.lock();
        if fail {
            faults.failing_fetches.insert(entity_type);
        } else {
            faults.failing_fetches.remove(&entity_type);
        }
    }

    /// 让某实体类型的写入（upsert / delete）失败
    pub fn fail_writes(&self, entity_type: EntityType, fail: bool) {
        let mut faults = self.faults.lock();
        if fail {
            faults.failing_writes.insert(entity_type);
        } else {
            faults.failing_writes.remove(&entity_type);
        }
    }

    /// 每个操作前的人为延迟
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().latency = latency;
    }

    /// 直接写入远端数据（模拟其他设备）
    pub fn seed_bookmarks(&self, uid: &str, bookmarks: Vec<Bookmark>) {
        let mut users = self.users.lock();
        let rows = users.entry(uid.to_string()).or_default();
        for bookmark in bookmarks {
            rows.bookmarks.insert(bookmark.title_id.clone(), bookmark);
        }
    }

    pub fn seed_progress(&self, uid: &str, progress: Vec<ReadingProgress>) {
        let mut users = self.users.lock();
        let rows = users.entry(uid.to_string()).or_default();
        for record in progress {
            rows.progress.insert(record.title_id.clone(), record);
        }
    }

    pub fn bookmarks_of(&self, uid: &str) -> Vec<Bookmark> {
        self.users
            .lock()
            .get(uid)
            .map(|rows| rows.bookmarks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn progress_of(&self, uid: &str) -> Vec<ReadingProgress> {
        self.users
            .lock()
            .get(uid)
            .map(|rows| rows.progress.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bookmark_upsert_count(&self) -> usize {
        self.bookmark_upserts.load(Ordering::SeqCst)
    }

    pub fn bookmark_delete_count(&self) -> usize {
        self.bookmark_deletes.load(Ordering::SeqCst)
    }

    pub fn progress_upsert_count(&self) -> usize {
        self.progress_upserts.load(Ordering::SeqCst)
    }

    async fn before_fetch(&self, entity_type: EntityType) -> Result<()> {
        self.simulate_latency().await;
        let faults = self.faults.lock();
        if faults.offline || faults.failing_fetches.contains(&entity_type) {
            return Err(InkshelfSDKError::Transport(format!(
                "{} 拉取失败: network unreachable",
                entity_type
            )));
        }
        Ok(())
    }

    async fn before_write(&self, entity_type: EntityType) -> Result<()> {
        self.simulate_latency().await;
        let faults = self.faults.lock();
        if faults.offline || faults.failing_writes.contains(&entity_type) {
            return Err(InkshelfSDKError::Transport(format!(
                "{} 写入失败: network unreachable",
                entity_type
            )));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = self.faults.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>> {
        self.before_fetch(EntityType::Bookmark).await?;
        Ok(self.bookmarks_of(uid))
    }

    async fn fetch_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>> {
        self.before_fetch(EntityType::ReadingProgress).await?;
        Ok(self.progress_of(uid))
    }

    async fn upsert_bookmark(&self, uid: &str, bookmark: &Bookmark) -> Result<()> {
        self.before_write(EntityType::Bookmark).await?;
        self.bookmark_upserts.fetch_add(1, Ordering::SeqCst);
        self.seed_bookmarks(uid, vec![bookmark.clone()]);
        Ok(())
    }

    async fn delete_bookmark(&self, uid: &str, title_id: &str) -> Result<()> {
        self.before_write(EntityType::Bookmark).await?;
        self.bookmark_deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(rows) = self.users.lock().get_mut(uid) {
            rows.bookmarks.remove(title_id);
        }
        Ok(())
    }

    async fn upsert_progress(&self, uid: &str, progress: &ReadingProgress) -> Result<()> {
        self.before_write(EntityType::ReadingProgress).await?;
        self.progress_upserts.fetch_add(1, Ordering::SeqCst);
        self.seed_progress(uid, vec![progress.clone()]);
        Ok(())
    }

    async fn delete_all_progress(&self, uid: &str) -> Result<()> {
        self.before_write(EntityType::ReadingProgress).await?;
        if let Some(rows) = self.users.lock().get_mut(uid) {
            rows.progress.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_keyed_by_user_and_title() {
        let remote = InMemoryRemoteStore::new();
        let mut progress = ReadingProgress::new("t", 1);
        remote.upsert_progress("u1", &progress).await.unwrap();
        progress.updated_at = 2;
        remote.upsert_progress("u1", &progress).await.unwrap();
        remote.upsert_progress("u2", &progress).await.unwrap();

        assert_eq!(remote.progress_of("u1").len(), 1);
        assert_eq!(remote.progress_of("u1")[0].updated_at, 2);
        assert_eq!(remote.progress_of("u2").len(), 1);
        assert_eq!(remote.progress_upsert_count(), 3);
    }

    #[tokio::test]
    async fn injected_faults_fail_without_applying() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_writes(EntityType::Bookmark, true);
        let result = remote
            .upsert_bookmark("u1", &Bookmark::new("a", "A", 1))
            .await;
        assert!(matches!(result, Err(InkshelfSDKError::Transport(_))));
        assert!(remote.bookmarks_of("u1").is_empty());

        remote.fail_writes(EntityType::Bookmark, false);
        remote.fail_fetch(EntityType::ReadingProgress, true);
        assert!(remote.fetch_bookmarks("u1").await.is_ok());
        assert!(remote.fetch_progress("u1").await.is_err());

        remote.set_offline(true);
        assert!(remote.fetch_bookmarks("u1").await.is_err());
    }
}
