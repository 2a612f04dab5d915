//! Embedding cache
//!
//! Memoizes text → vector lookups in front of the embedding provider.
//!
//! - Keys are SHA-256 hex digests of the raw text.
//! - Entries expire `ttl` after creation; a hit refreshes recency only.
//! - Capacity is enforced by LRU eviction on insert.
//! - All entry mutation goes through one mutex. The mutex is never held
//!   across an await, so lookups from concurrent turns only contend for
//!   the few instructions of a map access.
//! - Provider load is bounded by a separate semaphore of `max_in_flight`
//!   permits, independent of the lock.
//! - Concurrent misses on the same text share one provider call: the first
//!   caller fills a per-key cell, later callers await it.
//!
//! Internal primitives are built lazily on first use; `init` is idempotent
//! and `invalidate` resets the cache in place so tests can share one
//! instance between cases.

use futures_util::future::join_all;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::embedding::EmbeddingProvider;
use crate::errors::{AgentError, Result};

/// One memoized embedding
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub text_hash: String,
    pub vector: Vec<f32>,
    pub created_at: Instant,
    pub last_access: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.created_at) >= ttl
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub provider_calls: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Provider result shared by every caller waiting on the same key
type PendingEmbedding = Arc<OnceCell<Option<Vec<f32>>>>;

struct CacheInner {
    entries: Mutex<LruCache<String, CacheEntry>>,
    pending: Mutex<HashMap<String, PendingEmbedding>>,
    permits: Semaphore,
    ttl: Duration,
    capacity: NonZeroUsize,
}

impl CacheInner {
    fn entries(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingEmbedding>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Memoizing embedding cache
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    config: CacheConfig,
    inner: OnceLock<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    provider_calls: AtomicU64,
    evictions: AtomicU64,
}

/// SHA-256 hex digest used as the cache key
pub fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

impl EmbeddingCache {
    /// Create a cache in front of `provider`. Nothing is allocated until first use.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: CacheConfig) -> Self {
        Self {
            provider,
            config,
            inner: OnceLock::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Build the lock, semaphore and limits. Repeated calls are no-ops.
    pub fn init(&self) {
        self.inner();
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    fn inner(&self) -> &CacheInner {
        self.inner.get_or_init(|| {
            let capacity = NonZeroUsize::new(self.config.capacity).unwrap_or(NonZeroUsize::MIN);
            debug!(
                capacity = capacity.get(),
                ttl_secs = self.config.ttl_secs,
                max_in_flight = self.config.max_in_flight,
                "embedding cache initialized"
            );
            CacheInner {
                entries: Mutex::new(LruCache::new(capacity)),
                pending: Mutex::new(HashMap::new()),
                permits: Semaphore::new(self.config.max_in_flight.max(1)),
                ttl: self.config.ttl(),
                capacity,
            }
        })
    }

    /// Embed `text`, serving from cache within the TTL window.
    /// Blank text returns `None` without touching the provider.
    pub async fn get(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let key = hash_text(text);
        if let Some(vector) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(vector));
        }

        self.fetch(key, text).await
    }

    /// Single-flight miss path. Only the caller that initializes the
    /// pending cell for `key` talks to the provider.
    async fn fetch(&self, key: String, text: &str) -> Result<Option<Vec<f32>>> {
        let inner = self.inner();
        let cell = inner.pending().entry(key.clone()).or_default().clone();

        let mut joined = true;
        let outcome = cell
            .get_or_try_init(|| {
                joined = false;
                async {
                    let _permit = inner.permits.acquire().await.map_err(|e| {
                        AgentError::EmbeddingError(format!("embedding semaphore closed: {}", e))
                    })?;

                    // Filled by an earlier flight that already finished
                    if let Some(vector) = self.lookup(&key) {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(Some(vector));
                    }

                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let vector = self.call_provider(text).await?;
                    if let Some(v) = &vector {
                        self.store(key.clone(), v.clone());
                    }
                    Ok::<_, AgentError>(vector)
                }
            })
            .await
            .cloned();

        {
            let mut pending = inner.pending();
            if pending.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                pending.remove(&key);
            }
        }

        if joined && outcome.is_ok() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Embed many texts. Only cache misses reach the provider (each distinct
    /// text once); results come back in input order.
    pub async fn get_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: HashMap<String, Vec<usize>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            let key = hash_text(text);
            if let Some(vector) = self.lookup(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                results[idx] = Some(vector);
                continue;
            }
            let slots = pending.entry(key.clone()).or_default();
            if slots.is_empty() {
                order.push(key);
            }
            slots.push(idx);
        }

        if order.is_empty() {
            return Ok(results);
        }

        let calls = order.iter().map(|key| {
            let first = pending[key][0];
            self.fetch(key.clone(), texts[first].as_str())
        });
        let embedded = join_all(calls).await;

        for (key, outcome) in order.into_iter().zip(embedded) {
            let vector = outcome?;
            for &idx in &pending[&key] {
                results[idx] = vector.clone();
            }
        }

        Ok(results)
    }

    async fn call_provider(&self, text: &str) -> Result<Option<Vec<f32>>> {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        match self.provider.embed(text).await {
            Ok(vector) => Ok(vector.filter(|v| !v.is_empty())),
            Err(e) => {
                warn!(error = %e, "embedding provider call failed");
                Err(e)
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let inner = self.inner();
        let now = Instant::now();
        let mut entries = inner.entries();

        let expired = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(inner.ttl, now) => {
                entry.last_access = now;
                return Some(entry.vector.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    fn store(&self, key: String, vector: Vec<f32>) {
        let inner = self.inner();
        let now = Instant::now();
        let entry = CacheEntry {
            text_hash: key.clone(),
            vector,
            created_at: now,
            last_access: now,
        };

        let mut entries = inner.entries();
        // push returns the replaced entry for an existing key, or the evicted LRU entry
        if let Some((displaced, _)) = entries.push(key.clone(), entry) {
            if displaced != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop every entry past its TTL. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let inner = self.inner();
        let now = Instant::now();
        let mut entries = inner.entries();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(inner.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.evictions
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Periodically purge expired entries until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, "expired embeddings purged");
                }
            }
        })
    }

    /// Remove every entry and reset counters
    pub fn invalidate(&self) {
        if let Some(inner) = self.inner.get() {
            inner.entries().clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.provider_calls.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.inner.get().map(|inner| inner.entries().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, text: &str) -> bool {
        let key = hash_text(text);
        self.inner
            .get()
            .map(|inner| inner.entries().contains(&key))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self
                .inner
                .get()
                .map(|inner| inner.capacity.get())
                .unwrap_or(self.config.capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(vec![text.chars().count() as f32, 1.0]))
        }
    }

    fn cache_with(provider: Arc<CountingProvider>, capacity: usize, ttl_secs: u64) -> EmbeddingCache {
        EmbeddingCache::new(
            provider,
            CacheConfig {
                capacity,
                ttl_secs,
                max_in_flight: 2,
                sweep_interval_secs: 60,
            },
        )
    }

    #[tokio::test]
    async fn test_second_get_is_served_from_cache() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 8, 3600);

        let first = cache.get("工務局").await.unwrap();
        let second = cache.get("工務局").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_blank_text_skips_provider() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 8, 3600);

        assert!(cache.get("   ").await.unwrap().is_none());
        assert!(cache.get("").await.unwrap().is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 3, 3600);

        for i in 0..10 {
            cache.get(&format!("text {}", i)).await.unwrap();
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("text 0"));
        assert!(cache.contains("text 9"));
    }

    #[tokio::test]
    async fn test_lru_keeps_recently_used() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 2, 3600);

        cache.get("a1").await.unwrap();
        cache.get("b2").await.unwrap();
        cache.get("a1").await.unwrap();
        cache.get("c3").await.unwrap();

        assert!(cache.contains("a1"));
        assert!(!cache.contains("b2"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 8, 0);

        cache.get("公文").await.unwrap();
        cache.get("公文").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 8, 0);

        cache.get("x1").await.unwrap();
        cache.get("x2").await.unwrap();
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_dedupes() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 16, 3600);
        cache.get("bb").await.unwrap();

        let texts = vec![
            "a".to_string(),
            "bb".to_string(),
            "".to_string(),
            "ccc".to_string(),
            "a".to_string(),
        ];
        let results = cache.get_batch(&texts).await.unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(results[0].as_ref().unwrap()[0], 1.0);
        assert_eq!(results[1].as_ref().unwrap()[0], 2.0);
        assert!(results[2].is_none());
        assert_eq!(results[3].as_ref().unwrap()[0], 3.0);
        assert_eq!(results[4], results[0]);
        // "bb" from the warm-up, then "a" and "ccc" once each
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_in_flight_calls_are_bounded() {
        let provider = Arc::new(CountingProvider {
            delay_ms: 20,
            ..Default::default()
        });
        let cache = cache_with(provider.clone(), 64, 3600);

        let texts: Vec<String> = (0..8).map(|i| format!("doc {}", i)).collect();
        cache.get_batch(&texts).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 8);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_call() {
        let provider = Arc::new(CountingProvider {
            delay_ms: 20,
            ..Default::default()
        });
        let cache = EmbeddingCache::new(provider.clone(), CacheConfig::default());

        let lookups = (0..4).map(|_| cache.get("橋梁檢測"));
        let results = join_all(lookups).await;

        assert!(results.iter().all(|r| matches!(r, Ok(Some(_)))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 3);
        assert!(cache.inner().pending().is_empty());
    }

    #[tokio::test]
    async fn test_batch_joins_an_in_flight_get() {
        let provider = Arc::new(CountingProvider {
            delay_ms: 20,
            ..Default::default()
        });
        let cache = cache_with(provider.clone(), 16, 3600);
        let texts = vec!["派工單".to_string(), "工單".to_string()];

        let (single, batch) = tokio::join!(cache.get("派工單"), cache.get_batch(&texts));

        assert_eq!(single.unwrap(), batch.unwrap()[0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_init_is_lazy_and_idempotent() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider, 8, 3600);

        assert!(!cache.is_initialized());
        cache.init();
        cache.init();
        assert!(cache.is_initialized());
        assert_eq!(cache.stats().capacity, 8);
    }

    #[tokio::test]
    async fn test_invalidate_resets_state() {
        let provider = Arc::new(CountingProvider::default());
        let cache = cache_with(provider.clone(), 8, 3600);

        cache.get("reset me").await.unwrap();
        cache.invalidate();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);

        cache.get("reset me").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
