//! 带过期时间的内存缓存
//!
//! SDK 门面用它缓存按作品查询的阅读进度；每次进度修改后显式失效。
//! 缓存不参与合并逻辑，过期判定是纯函数，便于测试。
//!
//! 读穿时先取 `generation()`，加载完成后用 `insert_if_current` 写回：
//! 加载期间发生过失效则放弃写回，避免把旧值缓存一个 TTL。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

/// 缓存配置
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    pub ttl: Duration,
    /// 最大缓存条目数
    pub max_entries: usize,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 1_000,
        }
    }
}

/// 条目是否已过期
pub fn is_expired<V>(entry: &CacheEntry<V>, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(entry.inserted_at) >= ttl
}

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    /// 每次失效 +1，只在持有写锁时修改
    generation: AtomicU64,
    config: TtlCacheConfig,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(config: TtlCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            config,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !is_expired(entry, now, self.config.ttl) => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
            }
        }
        self.remove_if_expired(key, now)
    }

    /// 读锁下看到的过期条目在释放读锁后可能已被新值替换，持写锁重新判定
    fn remove_if_expired(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.write();
        if entries
            .get(key)
            .map_or(false, |entry| is_expired(entry, now, self.config.ttl))
        {
            debug!("缓存过期: {:?}", key);
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// 当前失效代数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// 自 `generation` 读取以来没有发生失效才写入，返回是否写入
    pub fn insert_if_current(&self, key: K, value: V, generation: u64) -> bool {
        self.insert_checked(key, value, Instant::now(), Some(generation))
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        self.insert_checked(key, value, now, None);
    }

    fn insert_checked(&self, key: K, value: V, now: Instant, generation: Option<u64>) -> bool {
        let mut entries = self.entries.write();
        if let Some(expected) = generation {
            if self.generation.load(Ordering::SeqCst) != expected {
                debug!("加载期间缓存已失效，放弃写回: {:?}", key);
                return false;
            }
        }
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            // 先清过期条目，仍然满则移除最旧的
            let ttl = self.config.ttl;
            entries.retain(|_, entry| !is_expired(entry, now, ttl));
            if entries.len() >= self.config.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
        true
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write();
        entries.remove(key);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize) -> TtlCache<String, u32> {
        TtlCache::new(TtlCacheConfig {
            ttl: Duration::from_secs(10),
            max_entries,
        })
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = cache(10);
        let start = Instant::now();
        cache.insert_at("a".into(), 1, start);

        assert_eq!(cache.get_at(&"a".into(), start + Duration::from_secs(9)), Some(1));
        assert_eq!(cache.get_at(&"a".into(), start + Duration::from_secs(10)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = cache(10);
        cache.insert("a".into(), 1);
        cache.invalidate(&"a".into());
        assert_eq!(cache.get(&"a".into()), None);
    }

    #[test]
    fn load_overlapping_invalidation_is_not_cached() {
        let cache = cache(10);
        let generation = cache.generation();
        // 加载进行中，另一处提交了新值并失效
        cache.invalidate(&"a".into());
        assert!(!cache.insert_if_current("a".into(), 1, generation));
        assert_eq!(cache.get(&"a".into()), None);

        let generation = cache.generation();
        assert!(cache.insert_if_current("a".into(), 2, generation));
        assert_eq!(cache.get(&"a".into()), Some(2));

        let generation = cache.generation();
        cache.clear();
        assert!(!cache.insert_if_current("b".into(), 3, generation));
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_lookup_keeps_fresh_replacement() {
        let cache = cache(10);
        let start = Instant::now();
        cache.insert_at("a".into(), 1, start);
        let later = start + Duration::from_secs(20);
        // 读锁下看到的是过期的旧值，拿到写锁前被新值替换
        cache.insert_at("a".into(), 2, later);
        assert_eq!(cache.remove_if_expired(&"a".into(), later), Some(2));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove_if_expired(&"a".into(), later + Duration::from_secs(10)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let cache = cache(2);
        let start = Instant::now();
        cache.insert_at("a".into(), 1, start);
        cache.insert_at("b".into(), 2, start + Duration::from_secs(1));
        cache.insert_at("c".into(), 3, start + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        let now = start + Duration::from_secs(3);
        assert_eq!(cache.get_at(&"a".into(), now), None);
        assert_eq!(cache.get_at(&"c".into(), now), Some(3));
    }

    #[test]
    fn expiry_check_is_pure() {
        let start = Instant::now();
        let entry = CacheEntry {
            value: (),
            inserted_at: start,
        };
        assert!(!is_expired(&entry, start, Duration::from_secs(1)));
        assert!(is_expired(&entry, start + Duration::from_secs(1), Duration::from_secs(1)));
        // 插入时间晚于 now 不算过期
        let future = CacheEntry {
            value: (),
            inserted_at: start + Duration::from_secs(5),
        };
        assert!(!is_expired(&future, start, Duration::from_secs(1)));
    }
}
