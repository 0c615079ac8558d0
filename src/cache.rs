//! 缓存抽象模块
//! 定义被测缓存的统一接口，以及几个可以直接跑起来的参考实现

use crate::config::{StoreType, WorkloadConfig, messages};
use crate::error::{ErrorContext, Result};
use hashlink::LruCache as HashlinkLruCache;
use lru::LruCache;
use mini_moka::sync::Cache as MokaCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 缓存中的 value
pub type Value = Arc<[u8]>;

/// 被测缓存接口，必须能被多个工作线程同时调用
pub trait CacheAdapter: Send + Sync {
    /// 写入键值对
    fn put(&self, key: String, value: Value);

    /// 读取，未命中返回 None
    fn get(&self, key: &str) -> Option<Value>;

    /// 当前条目数
    fn size(&self) -> u64;

    /// 缓存名称（用于日志）
    fn name(&self) -> &'static str;

    /// 分层命中统计，未开启监控时为 None
    fn tier_stats(&self) -> Option<TierStats> {
        None
    }
}

impl<C: CacheAdapter + ?Sized> CacheAdapter for Box<C> {
    fn put(&self, key: String, value: Value) {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn tier_stats(&self) -> Option<TierStats> {
        (**self).tier_stats()
    }
}

/// 分层命中统计快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierStats {
    pub heap_hits: u64,
    pub offheap_hits: u64,
    pub misses: u64,
    /// 从热层降级到冷层的条目数
    pub demotions: u64,
}

impl fmt::Display for TierStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "heap hits: {}, offheap hits: {}, misses: {}, demotions: {}",
            self.heap_hits, self.offheap_hits, self.misses, self.demotions
        )
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    heap_hits: AtomicU64,
    offheap_hits: AtomicU64,
    misses: AtomicU64,
    demotions: AtomicU64,
}

impl TierCounters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TierStats {
        TierStats {
            heap_hits: self.heap_hits.load(Ordering::Relaxed),
            offheap_hits: self.offheap_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn capacity(count: u64) -> NonZeroUsize {
    usize::try_from(count)
        .ok()
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::MIN)
}

/// 纯堆上存储：容量为 maxOnHeapCount 的 Hashlink LRU
pub struct HeapStore {
    entries: Mutex<HashlinkLruCache<String, Value>>,
    counters: Option<TierCounters>,
}

impl HeapStore {
    pub fn new(max_entries: u64, monitoring: bool) -> Self {
        Self {
            entries: Mutex::new(HashlinkLruCache::new(capacity(max_entries).get())),
            counters: monitoring.then(TierCounters::default),
        }
    }
}

impl CacheAdapter for HeapStore {
    #[inline]
    fn put(&self, key: String, value: Value) {
        lock(&self.entries).insert(key, value);
    }

    #[inline]
    fn get(&self, key: &str) -> Option<Value> {
        let found = lock(&self.entries).get(key).cloned();
        if let Some(counters) = &self.counters {
            match found {
                Some(_) => TierCounters::bump(&counters.heap_hits),
                None => TierCounters::bump(&counters.misses),
            }
        }
        found
    }

    #[inline]
    fn size(&self) -> u64 {
        lock(&self.entries).len() as u64
    }

    #[inline]
    fn name(&self) -> &'static str {
        "Hashlink LRU heap store"
    }

    fn tier_stats(&self) -> Option<TierStats> {
        self.counters.as_ref().map(TierCounters::snapshot)
    }
}

/// 两层存储：热层是容量为 maxOnHeapCount 的 LRU，
/// 被挤出的条目降级到按字节加权、容量为 offHeapSize 的 Mini-Moka 冷层，
/// 冷层命中后提升回热层。
pub struct TieredStore {
    label: &'static str,
    heap: Mutex<LruCache<String, Value>>,
    offheap: MokaCache<String, Value>,
    counters: Option<TierCounters>,
}

impl TieredStore {
    pub fn new(label: &'static str, max_on_heap: u64, off_heap_bytes: u64, monitoring: bool) -> Self {
        let offheap = MokaCache::builder()
            .weigher(|_key: &String, value: &Value| -> u32 {
                u32::try_from(value.len()).unwrap_or(u32::MAX)
            })
            .max_capacity(off_heap_bytes)
            .build();
        Self {
            label,
            heap: Mutex::new(LruCache::new(capacity(max_on_heap))),
            offheap,
            counters: monitoring.then(TierCounters::default),
        }
    }

    /// 写入热层，被挤出的条目降级到冷层。调用方必须持有热层锁，
    /// 冷层的增删因此与热层的变化保持同一顺序
    fn push_hot(&self, heap: &mut LruCache<String, Value>, key: String, value: Value) {
        self.offheap.invalidate(&key);
        match heap.push(key, value) {
            // 同 key 覆盖时旧值不需要降级
            Some((old_key, old_value)) if !heap.contains(&old_key) => {
                self.offheap.insert(old_key, old_value);
                if let Some(counters) = &self.counters {
                    TierCounters::bump(&counters.demotions);
                }
            }
            _ => {}
        }
    }
}

impl CacheAdapter for TieredStore {
    #[inline]
    fn put(&self, key: String, value: Value) {
        let mut heap = lock(&self.heap);
        self.push_hot(&mut heap, key, value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        let mut heap = lock(&self.heap);
        if let Some(value) = heap.get(key).cloned() {
            if let Some(counters) = &self.counters {
                TierCounters::bump(&counters.heap_hits);
            }
            return Some(value);
        }

        // 提升期间一直持有热层锁，并发的 put 不会被旧值覆盖
        let key = key.to_owned();
        match self.offheap.get(&key) {
            Some(value) => {
                if let Some(counters) = &self.counters {
                    TierCounters::bump(&counters.offheap_hits);
                }
                self.push_hot(&mut heap, key, value.clone());
                Some(value)
            }
            None => {
                if let Some(counters) = &self.counters {
                    TierCounters::bump(&counters.misses);
                }
                None
            }
        }
    }

    /// 冷层条目数是近似值
    fn size(&self) -> u64 {
        lock(&self.heap).len() as u64 + self.offheap.entry_count()
    }

    fn name(&self) -> &'static str {
        self.label
    }

    fn tier_stats(&self) -> Option<TierStats> {
        self.counters.as_ref().map(TierCounters::snapshot)
    }
}

/// 按 storeType 构建参考存储
pub fn build_store(config: &WorkloadConfig) -> Result<Box<dyn CacheAdapter>> {
    let monitoring = config.monitoring_enabled;
    let store: Box<dyn CacheAdapter> = match config.store_type {
        StoreType::Onheap => Box::new(HeapStore::new(config.max_on_heap_count, monitoring)),
        StoreType::Offheap => {
            let bytes = config
                .off_heap_bytes()
                .with_context(messages::STORE_BUILD_FAILED)?;
            Box::new(TieredStore::new(
                "LRU + Mini-Moka offheap tiered store",
                config.max_on_heap_count,
                bytes,
                monitoring,
            ))
        }
        StoreType::Disk => {
            let bytes = config
                .off_heap_bytes()
                .with_context(messages::STORE_BUILD_FAILED)?;
            log::warn!(
                "disk tier at {} is not persisted, running as a tiered in-memory store",
                config.disk_store_path
            );
            Box::new(TieredStore::new(
                "LRU + Mini-Moka disk tiered store",
                config.max_on_heap_count,
                bytes,
                monitoring,
            ))
        }
    };
    log::info!("built {} for store type {}", store.name(), config.store_type);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(tag: u8) -> Value {
        Arc::from(vec![tag; 16])
    }

    #[test]
    fn heap_store_is_bounded() {
        let store = HeapStore::new(3, false);
        for i in 0..5u8 {
            store.put(format!("K{}-", i), value(i));
        }
        assert_eq!(store.size(), 3);
        assert!(store.get("K0-").is_none());
        assert_eq!(store.get("K4-").unwrap()[0], 4);
        assert_eq!(store.tier_stats(), None);
    }

    #[test]
    fn heap_store_counts_hits() {
        let store = HeapStore::new(10, true);
        store.put("K1-".into(), value(1));
        store.get("K1-");
        store.get("K2-");
        let stats = store.tier_stats().unwrap();
        assert_eq!(stats.heap_hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let store = HeapStore::new(0, false);
        store.put("K1-".into(), value(1));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn tiered_store_demotes_and_promotes() {
        let store = TieredStore::new("test", 2, 1 << 20, true);
        store.put("K0-".into(), value(0));
        store.put("K1-".into(), value(1));
        store.put("K2-".into(), value(2));

        // K0 被挤到冷层，读取后提升回热层
        assert_eq!(store.get("K0-").unwrap()[0], 0);
        assert_eq!(store.get("K2-").unwrap()[0], 2);
        assert!(store.get("K9-").is_none());

        let stats = store.tier_stats().unwrap();
        assert_eq!(stats.offheap_hits, 1);
        assert_eq!(stats.heap_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.demotions, 2);
    }

    #[test]
    fn tiered_store_overwrite_is_not_a_demotion() {
        let store = TieredStore::new("test", 2, 1 << 20, true);
        store.put("K0-".into(), value(0));
        store.put("K0-".into(), value(7));
        assert_eq!(store.get("K0-").unwrap()[0], 7);
        assert_eq!(store.tier_stats().unwrap().demotions, 0);
    }

    #[test]
    fn promotion_never_overwrites_a_newer_put() {
        const VERSIONS: u8 = 200;
        let store = TieredStore::new("test", 1, 1 << 20, false);
        store.put("K0-".into(), value(0));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for version in 1..=VERSIONS {
                    store.put("K0-".into(), value(version));
                    // 把 K0 挤到冷层，下一次读会触发提升
                    store.put("K1-".into(), value(0));
                }
            });
            for _ in 0..3 {
                scope.spawn(|| {
                    let mut seen = 0;
                    for _ in 0..5_000 {
                        let version = store.get("K0-").unwrap()[0];
                        assert!(version >= seen, "read {} after {}", version, seen);
                        seen = version;
                    }
                });
            }
        });

        assert_eq!(store.get("K0-").unwrap()[0], VERSIONS);
    }

    #[test]
    fn builds_every_store_type() {
        let mut config = crate::config::WorkloadConfig {
            store_type: StoreType::Onheap,
            thread_count: 1,
            entry_count: 10,
            off_heap_size: "1M".into(),
            max_on_heap_count: 4,
            batch_count: 5,
            max_value_size: 20,
            min_value_size: 10,
            hot_set_percentage: 0,
            rounds: 1,
            update_percentage: 0,
            disk_store_path: "/tmp/pounder".into(),
            monitoring_enabled: false,
            seed: None,
        };
        for store_type in [StoreType::Onheap, StoreType::Offheap, StoreType::Disk] {
            config.store_type = store_type;
            let store = build_store(&config).unwrap();
            store.put("K1-".into(), value(1));
            assert!(store.get("K1-").is_some(), "{}", store.name());
        }
    }
}
