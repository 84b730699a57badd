//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - 用户隔离的命名空间（每个用户一个 Tree）
//! - JSON 编码的值读写
//! - 落盘 flush，保证进程重启后数据仍在

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tokio::sync::RwLock;

use crate::error::{InkshelfSDKError, Result};

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    /// 主数据库实例
    db: Arc<Db>,
    /// 用户专属的 Tree 实例
    user_trees: Arc<RwLock<HashMap<String, Tree>>>,
}

impl KvStore {
    /// 创建新的 KV 存储实例
    pub async fn new(base_path: &Path) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| InkshelfSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 上一个进程刚退出时锁可能尚未释放，带退避重试
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            InkshelfSDKError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        tracing::debug!("KV 存储已打开: {}", kv_path.display());

        Ok(Self {
            db: Arc::new(db),
            user_trees: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// 获取用户 Tree，不存在时打开
    async fn user_tree(&self, uid: &str) -> Result<Tree> {
        {
            let user_trees = self.user_trees.read().await;
            if let Some(tree) = user_trees.get(uid) {
                return Ok(tree.clone());
            }
        }

        let tree_name = format!("user_{}", uid);
        let tree = self
            .db
            .open_tree(&tree_name)
            .map_err(|e| InkshelfSDKError::KvStore(format!("打开用户 Tree 失败: {}", e)))?;

        let mut user_trees = self.user_trees.write().await;
        user_trees.insert(uid.to_string(), tree.clone());
        tracing::info!("用户 KV Tree 初始化完成: {}", uid);

        Ok(tree)
    }

    /// 清理用户数据
    pub async fn cleanup_user_data(&self, uid: &str) -> Result<()> {
        let mut user_trees = self.user_trees.write().await;
        user_trees.remove(uid);

        let tree_name = format!("user_{}", uid);
        self.db
            .drop_tree(&tree_name)
            .map_err(|e| InkshelfSDKError::KvStore(format!("删除用户 Tree 失败: {}", e)))?;

        Ok(())
    }

    /// 设置键值对（JSON 编码）
    pub async fn set<K, V>(&self, uid: &str, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| InkshelfSDKError::Serialization(format!("序列化值失败: {}", e)))?;
        self.set_raw(uid, key, value_bytes).await
    }

    /// 直接写入原始字节
    pub async fn set_raw<K>(&self, uid: &str, key: K, value: Vec<u8>) -> Result<()>
    where
        K: AsRef<[u8]>,
    {
        let tree = self.user_tree(uid).await?;
        tree.insert(key, value)
            .map_err(|e| InkshelfSDKError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    /// 获取键值对
    ///
    /// 值无法解析时返回 `Serialization` 错误，由调用方决定如何降级。
    pub async fn get<K, V>(&self, uid: &str, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        match self.get_raw(uid, key).await? {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| InkshelfSDKError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 读取原始字节
    pub async fn get_raw<K>(&self, uid: &str, key: K) -> Result<Option<Vec<u8>>>
    where
        K: AsRef<[u8]>,
    {
        let tree = self.user_tree(uid).await?;
        let result = tree
            .get(key)
            .map_err(|e| InkshelfSDKError::KvStore(format!("获取键值对失败: {}", e)))?;
        Ok(result.map(|v| v.to_vec()))
    }

    /// 删除键值对
    pub async fn delete<K>(&self, uid: &str, key: K) -> Result<Option<Vec<u8>>>
    where
        K: AsRef<[u8]>,
    {
        let tree = self.user_tree(uid).await?;
        let result = tree
            .remove(key)
            .map_err(|e| InkshelfSDKError::KvStore(format!("删除键值对失败: {}", e)))?;
        Ok(result.map(|v| v.to_vec()))
    }

    /// 检查键是否存在
    pub async fn exists<K>(&self, uid: &str, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        let tree = self.user_tree(uid).await?;
        let result = tree
            .contains_key(key)
            .map_err(|e| InkshelfSDKError::KvStore(format!("检查键存在失败: {}", e)))?;
        Ok(result)
    }

    /// 刷盘
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| InkshelfSDKError::KvStore(format!("KV 刷盘失败: {}", e)))?;
        Ok(())
    }
}

/// 常用的键常量
pub mod keys {
    /// 书架集合
    pub const BOOKMARKS: &str = "bookmarks";
    /// 阅读进度集合
    pub const READING_PROGRESS: &str = "reading_progress";
    /// 远端删除失败的书签，下次同步重试
    pub const PENDING_BOOKMARK_DELETES: &str = "pending_bookmark_deletes";
    /// 本地持久化格式版本
    pub const SCHEMA_VERSION: &str = "schema_version";
}
