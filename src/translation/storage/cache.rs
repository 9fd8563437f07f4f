//! 翻译缓存模块
//!
//! 有界的 LRU 缓存，键为 `channelId:messageId:targetLanguage:model`。
//! 所有变更都会经过防抖后写入持久化存储，快照中键的顺序即为最近使用顺序（最旧在前）。

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde_json::{Map, Value};

use super::debounce::Debouncer;
use super::store::PersistentStore;
use crate::translation::config::constants;
use crate::translation::error::TranslationResult;

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存键
///
/// 由消息身份、目标语言和模型组成。注意其中不包含服务商或接口地址。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(channel_id: &str, message_id: &str, target_language: &str, model: &str) -> Self {
        Self(format!("{}:{}:{}:{}", channel_id, message_id, target_language, model))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

struct CacheState {
    entries: LruCache<String, String>,
    stats: CacheStats,
}

impl CacheState {
    fn snapshot(&self) -> Map<String, Value> {
        // lru 的迭代顺序是最近使用在前，快照要求最旧在前
        self.entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

/// 翻译缓存
///
/// 克隆开销很小，所有克隆共享同一份数据和同一个写入计时器。
#[derive(Clone)]
pub struct TranslationCache {
    state: Arc<Mutex<CacheState>>,
    store: Arc<dyn PersistentStore>,
    persister: Arc<Debouncer>,
}

// ============================================================================
// 实现
// ============================================================================

impl TranslationCache {
    /// 从存储中恢复缓存
    ///
    /// 快照缺失或损坏时得到空缓存；条目超过容量时保留最近的部分。
    pub fn load(store: Arc<dyn PersistentStore>, capacity: usize) -> Self {
        Self::load_with_debounce(
            store,
            capacity,
            Duration::from_millis(constants::CACHE_SAVE_DEBOUNCE_MS),
        )
    }

    pub fn load_with_debounce(
        store: Arc<dyn PersistentStore>,
        capacity: usize,
        debounce: Duration,
    ) -> Self {
        let mut entries = LruCache::new(non_zero(capacity));

        match store.get(constants::CACHE_STORE_KEY) {
            Some(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => {
                    for (key, value) in map {
                        if let Value::String(text) = value {
                            entries.push(key, text);
                        }
                    }
                    tracing::info!("已恢复翻译缓存: {} 条", entries.len());
                }
                Err(e) => {
                    tracing::warn!("缓存快照损坏，已重置为空: {}", e);
                }
            },
            None => tracing::debug!("没有找到缓存快照"),
        }

        let state = Arc::new(Mutex::new(CacheState {
            entries,
            stats: CacheStats::default(),
        }));

        let persister = {
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            Debouncer::new(debounce, move || {
                let snapshot = lock(&state).snapshot();
                if let Err(e) = write_snapshot(store.as_ref(), &snapshot) {
                    tracing::warn!("写入缓存快照失败: {}", e);
                }
            })
        };

        Self {
            state,
            store,
            persister: Arc::new(persister),
        }
    }

    /// 读取并刷新最近使用位置
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let mut state = lock(&self.state);
        state.stats.total_requests += 1;

        match state.entries.get(key.as_str()).cloned() {
            Some(value) => {
                state.stats.cache_hits += 1;
                Some(value)
            }
            None => {
                state.stats.cache_misses += 1;
                None
            }
        }
    }

    /// 读取但不影响最近使用顺序
    pub fn peek(&self, key: &CacheKey) -> Option<String> {
        lock(&self.state).entries.peek(key.as_str()).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.state).entries.contains(key.as_str())
    }

    /// 插入或覆盖，超出容量时淘汰最久未使用的条目
    pub fn set(&self, key: &CacheKey, value: impl Into<String>) {
        {
            let mut state = lock(&self.state);
            if let Some((evicted, _)) = state.entries.push(key.as_str().to_string(), value.into()) {
                if evicted != key.as_str() {
                    state.stats.evictions += 1;
                    tracing::debug!("缓存淘汰: {}", evicted);
                }
            }
        }
        self.persister.trigger();
    }

    /// 清空内存中的条目，并安排一次写入
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
        self.persister.trigger();
    }

    /// 清空并立即写入空快照
    pub fn reset(&self) -> TranslationResult<()> {
        self.persister.cancel();
        lock(&self.state).entries.clear();
        write_snapshot(self.store.as_ref(), &Map::new())
    }

    /// 调整容量并立即裁剪
    pub fn resize(&self, capacity: usize) {
        let capacity = non_zero(capacity);
        {
            let mut state = lock(&self.state);
            if state.entries.cap() == capacity {
                return;
            }
            let before = state.entries.len();
            state.entries.resize(capacity);
            let trimmed = before - state.entries.len();
            state.stats.evictions += trimmed as u64;
            tracing::debug!("缓存容量调整为 {}，裁剪 {} 条", capacity, trimmed);
        }
        self.persister.trigger();
    }

    /// 修改写入前的安静窗口
    pub fn set_save_debounce(&self, debounce: Duration) {
        self.persister.set_delay(debounce);
    }

    pub fn save_debounce(&self) -> Duration {
        self.persister.delay()
    }

    /// 立即写入尚未落盘的变更
    pub fn flush(&self) {
        self.persister.flush();
    }

    /// 是否有等待写入的变更
    pub fn has_pending_write(&self) -> bool {
        self.persister.is_dirty()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.state).entries.cap().get()
    }

    /// 按最近使用顺序列出所有键（最旧在前）
    pub fn keys_oldest_first(&self) -> Vec<String> {
        lock(&self.state)
            .entries
            .iter()
            .rev()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        let mut stats = state.stats.clone();
        stats.total_entries = state.entries.len();
        stats
    }
}

impl fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("TranslationCache")
            .field("len", &state.entries.len())
            .field("capacity", &state.entries.cap())
            .finish()
    }
}

// ============================================================================
// 实用函数
// ============================================================================

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

fn write_snapshot(store: &dyn PersistentStore, snapshot: &Map<String, Value>) -> TranslationResult<()> {
    let raw = serde_json::to_string(snapshot)?;
    store.set(constants::CACHE_STORE_KEY, &raw)?;
    tracing::debug!("缓存快照已写入: {} 条", snapshot.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::storage::MemoryStore;

    fn key(id: &str) -> CacheKey {
        CacheKey::new("10", id, "EN", "gpt")
    }

    fn cache_with(store: &MemoryStore, capacity: usize) -> TranslationCache {
        TranslationCache::load_with_debounce(
            Arc::new(store.clone()),
            capacity,
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(CacheKey::new("10", "20", "EN", "gpt").as_str(), "10:20:EN:gpt");
    }

    #[test]
    fn test_capacity_two_evicts_oldest() {
        let store = MemoryStore::new();
        let cache = cache_with(&store, 2);

        cache.set(&key("A"), "x");
        cache.set(&key("B"), "y");
        cache.set(&key("C"), "z");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&key("A")), None);
        assert_eq!(cache.peek(&key("B")).as_deref(), Some("y"));
        assert_eq!(cache.peek(&key("C")).as_deref(), Some("z"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_counts_as_touch() {
        let store = MemoryStore::new();
        let cache = cache_with(&store, 2);

        cache.set(&key("1"), "一");
        cache.set(&key("2"), "二");
        assert_eq!(cache.get(&key("1")).as_deref(), Some("一"));

        cache.set(&key("3"), "三");
        assert_eq!(cache.get(&key("1")).as_deref(), Some("一"));
        assert_eq!(cache.get(&key("2")), None);
        assert_eq!(cache.get(&key("3")).as_deref(), Some("三"));

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_overwrite_is_a_touch_not_an_eviction() {
        let store = MemoryStore::new();
        let cache = cache_with(&store, 2);

        cache.set(&key("1"), "a");
        cache.set(&key("2"), "b");
        cache.set(&key("1"), "c");
        cache.set(&key("3"), "d");

        assert_eq!(cache.keys_oldest_first(), vec!["10:1:EN:gpt", "10:3:EN:gpt"]);
        assert_eq!(cache.peek(&key("1")).as_deref(), Some("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_resize_trims_oldest() {
        let store = MemoryStore::new();
        let cache = cache_with(&store, 5);
        for id in ["1", "2", "3", "4", "5"] {
            cache.set(&key(id), id);
        }

        cache.resize(2);
        assert_eq!(cache.capacity(), 2);
        assert_eq!(cache.keys_oldest_first(), vec!["10:4:EN:gpt", "10:5:EN:gpt"]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = MemoryStore::new();
        let cache = cache_with(&store, 0);
        cache.set(&key("1"), "a");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_load_preserves_order_and_trims() {
        let store = MemoryStore::new();
        store
            .set(
                constants::CACHE_STORE_KEY,
                r#"{"10:1:EN:gpt":"a","10:2:EN:gpt":"b","10:3:EN:gpt":"c","bad":7}"#,
            )
            .unwrap();

        let cache = cache_with(&store, 2);
        assert_eq!(cache.keys_oldest_first(), vec!["10:2:EN:gpt", "10:3:EN:gpt"]);
    }

    #[test]
    fn test_malformed_snapshot_yields_empty_cache() {
        let store = MemoryStore::new();
        store.set(constants::CACHE_STORE_KEY, "{not json").unwrap();
        assert!(cache_with(&store, 10).is_empty());

        store.set(constants::CACHE_STORE_KEY, "[1, 2, 3]").unwrap();
        assert!(cache_with(&store, 10).is_empty());
    }

    #[test]
    fn test_reset_writes_empty_snapshot_immediately() {
        let store = MemoryStore::new();
        let cache = cache_with(&store, 10);
        cache.set(&key("1"), "a");
        cache.reset().unwrap();

        assert!(cache.is_empty());
        assert!(!cache.has_pending_write());
        assert_eq!(store.get(constants::CACHE_STORE_KEY).as_deref(), Some("{}"));
    }
}
