//! 同步游标存储
//!
//! 格式：sync_cursor:last_sync_at

use std::sync::Arc;

use crate::error::Result;
use crate::storage::kv::KvStore;

const PREFIX: &str = "sync_cursor";
const FULL_SYNC: &str = "last_sync_at";

/// 存储每个用户最近一次完整双向同步的时间（毫秒）
pub struct SyncCursorStore {
    kv: Arc<KvStore>,
}

impl SyncCursorStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    fn key() -> String {
        format!("{}:{}", PREFIX, FULL_SYNC)
    }

    /// 完整双向同步的时间
    pub async fn last_sync_at(&self, uid: &str) -> Result<Option<i64>> {
        self.kv.get::<&str, i64>(uid, Self::key().as_str()).await
    }

    pub async fn set_last_sync_at(&self, uid: &str, timestamp_ms: i64) -> Result<()> {
        self.kv.set(uid, Self::key().as_str(), &timestamp_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cursor_key_format() {
        assert_eq!(SyncCursorStore::key(), "sync_cursor:last_sync_at");
    }

    #[tokio::test]
    async fn cursor_round_trip_per_user() {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
        let cursors = SyncCursorStore::new(kv);

        assert_eq!(cursors.last_sync_at("u1").await.unwrap(), None);
        cursors.set_last_sync_at("u1", 40).await.unwrap();
        cursors.set_last_sync_at("u1", 42).await.unwrap();

        assert_eq!(cursors.last_sync_at("u1").await.unwrap(), Some(42));
        assert_eq!(cursors.last_sync_at("u2").await.unwrap(), None);
    }
}
