//! 指纹缓存：结构规划与知识检索结果在请求之间共享
//!
//! 键为内容指纹；容量满时一次淘汰最久未使用的一半条目。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// 由若干字段计算内容指纹
pub fn fingerprint(prefix: &str, parts: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    prefix.hash(&mut hasher);
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

/// 进程内共享的有界缓存
pub struct FingerprintCache<V> {
    inner: Mutex<LruCache<u64, V>>,
    capacity: usize,
    enabled: bool,
}

impl<V: Clone> FingerprintCache<V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            capacity: cap.get(),
            enabled: true,
        }
    }

    /// 关闭缓存：get 恒为 None，insert 不生效
    pub fn disabled() -> Self {
        let mut cache = Self::new(1);
        cache.enabled = false;
        cache
    }

    pub fn get(&self, key: u64) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(&key).cloned()
    }

    pub fn insert(&self, key: u64, value: V) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.contains(&key) && inner.len() >= self.capacity {
            let evict = (self.capacity / 2).max(1);
            for _ in 0..evict {
                inner.pop_lru();
            }
            tracing::debug!(evicted = evict, capacity = self.capacity, "Fingerprint cache full");
        }
        inner.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
