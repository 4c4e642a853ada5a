//! Generic in-process cache store.
//!
//! Key→value storage with per-entry TTL, access tracking, size-bounded batch
//! LRU eviction, and per-source hit/miss accounting. The store knows nothing
//! about HTTP, endpoints, or invalidation policy; those live in
//! [`crate::response`] and [`crate::invalidation`].

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, Metadata};
use crate::error::BoxError;
use crate::lock::{rw_read, rw_write};
use crate::stats::{CacheStats, StatsInner};
use crate::telemetry::{
    METRIC_STORE_EVICT_TOTAL, METRIC_STORE_EXPIRED_TOTAL, METRIC_STORE_HIT_TOTAL,
    METRIC_STORE_MISS_TOTAL, METRIC_SWEEP_MS,
};

const SOURCE: &str = "scorta::store";

/// Fraction of entries removed by one capacity eviction pass, as a divisor.
const EVICTION_BATCH_DIVISOR: usize = 10;

/// Read-only view of a live entry, cloned out for rule evaluation.
#[derive(Debug, Clone)]
pub struct EntrySnapshot<T> {
    pub key: String,
    pub source: String,
    pub data: T,
    pub metadata: Metadata,
    pub created_at: OffsetDateTime,
    pub last_accessed_at: OffsetDateTime,
    pub ttl: Duration,
    pub access_count: u64,
}

/// Generic TTL/LRU cache keyed by string.
///
/// Mutation happens inside short synchronous critical sections; no lock is
/// ever held across an `.await`. Concurrent cold misses through
/// [`CacheStore::get_or_fetch`] are **not** deduplicated; each caller runs
/// its own fetcher. Callers needing single-flight semantics for expensive
/// fetchers must add their own guard.
pub struct CacheStore<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    stats: RwLock<StatsInner>,
    max_size: NonZeroUsize,
    default_ttl: Duration,
    cleanup_interval: Duration,
    enable_metrics: bool,
}

impl<T: Clone> CacheStore<T> {
    /// Create a store from validated configuration.
    ///
    /// Zero limits are clamped rather than rejected here; call
    /// [`CacheConfig::validate`] first to surface misconfiguration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(StatsInner::default()),
            max_size: config.max_size_non_zero(),
            default_ttl: config.default_ttl(),
            cleanup_interval: config.cleanup_interval(),
            enable_metrics: config.enable_metrics,
        }
    }

    /// Look up a valid entry, recording a hit or miss for `source`.
    ///
    /// An expired entry found here is removed on the spot; the scheduled
    /// sweep covers keys nobody reads again.
    pub fn get(&self, key: &str, source: &str) -> Option<T> {
        let started = Instant::now();
        let result = self.lookup(key);
        self.record_get(source, result.is_some(), started.elapsed());
        result
    }

    /// Cached-or-compute: on a miss, run `fetcher` and store its result.
    ///
    /// Fetcher errors are logged with the triggering key/source and reported
    /// as a plain miss; nothing is retried and nothing propagates. The
    /// response-time sample covers the full call including the fetch.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, source: &str, fetcher: F) -> Option<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, BoxError>>,
    {
        let started = Instant::now();
        if let Some(value) = self.lookup(key) {
            self.record_get(source, true, started.elapsed());
            return Some(value);
        }

        let fetched = fetcher().await;
        let result = match fetched {
            Ok(Some(value)) => {
                self.set(key, value.clone(), source, None, None);
                Some(value)
            }
            Ok(None) => {
                debug!(
                    target_module = SOURCE,
                    key,
                    source,
                    "fetcher produced no value"
                );
                None
            }
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    source,
                    error = %error,
                    "fetcher failed, treating as miss"
                );
                None
            }
        };

        self.record_get(source, false, started.elapsed());
        result
    }

    /// Insert or replace an entry.
    ///
    /// At capacity, a batch of the least-recently-accessed entries is
    /// evicted first. Returns false when the payload cannot be serialized
    /// for size estimation; the previous entry, if any, is left untouched.
    pub fn set(
        &self,
        key: &str,
        data: T,
        source: &str,
        ttl: Option<Duration>,
        metadata: Option<Metadata>,
    ) -> bool
    where
        T: Serialize,
    {
        let size_bytes = match serde_json::to_vec(&data) {
            Ok(bytes) => bytes.len() as u64,
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    source,
                    error = %error,
                    "payload not serializable, entry not stored"
                );
                return false;
            }
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(key, data, source, ttl, metadata.unwrap_or_default(), size_bytes);

        let mut entries = rw_write(&self.entries, SOURCE, "set");
        if !entries.contains_key(key) && entries.len() >= self.max_size.get() {
            self.evict_batch(&mut entries);
        }
        entries.insert(key.to_string(), entry);
        true
    }

    pub fn delete(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "delete")
            .remove(key)
            .is_some()
    }

    /// Remove all entries and reset all stats.
    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
        rw_write(&self.stats, SOURCE, "clear.stats").reset();
    }

    /// Remove all entries for `source` and reset that source's stats.
    pub fn clear_source(&self, source: &str) {
        rw_write(&self.entries, SOURCE, "clear_source").retain(|_, entry| entry.source != source);
        rw_write(&self.stats, SOURCE, "clear_source.stats").reset_source(source);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate and per-source statistics, including the rough payload-size
    /// footprint of live entries.
    pub fn stats(&self) -> CacheStats {
        let (total_entries, estimated_bytes) = {
            let entries = rw_read(&self.entries, SOURCE, "stats");
            let bytes = entries.values().map(|entry| entry.size_bytes).sum();
            (entries.len(), bytes)
        };
        rw_read(&self.stats, SOURCE, "stats.counters").snapshot(total_entries, estimated_bytes)
    }

    /// Delete every entry past its TTL. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let sweep_started_at = Instant::now();
        let now = OffsetDateTime::now_utc();

        let mut entries = rw_write(&self.entries, SOURCE, "sweep_expired");
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        let removed = before - entries.len();
        drop(entries);

        if self.enable_metrics {
            if removed > 0 {
                counter!(METRIC_STORE_EXPIRED_TOTAL).increment(removed as u64);
            }
            histogram!(METRIC_SWEEP_MS, "sweep" => "expiry")
                .record(sweep_started_at.elapsed().as_secs_f64() * 1000.0);
        }
        removed
    }

    /// Clone out every live entry for rule evaluation.
    ///
    /// A sweep iterating this snapshot may race with a concurrent `set`; the
    /// entry is then observed in either its old or new state, never torn.
    pub fn snapshot(&self) -> Vec<EntrySnapshot<T>> {
        rw_read(&self.entries, SOURCE, "snapshot")
            .values()
            .map(|entry| EntrySnapshot {
                key: entry.key.clone(),
                source: entry.source.clone(),
                data: entry.data.clone(),
                metadata: entry.metadata.clone(),
                created_at: entry.created_at,
                last_accessed_at: entry.last_accessed_at,
                ttl: entry.ttl,
                access_count: entry.access_count,
            })
            .collect()
    }

    /// Spawn the periodic expiry sweep at the configured cleanup interval.
    ///
    /// Missed ticks are skipped, not made up. Abort the handle on teardown.
    pub fn spawn_expiry_sweeper(store: Arc<Self>) -> JoinHandle<()>
    where
        T: Send + Sync + 'static,
    {
        let period = store.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    debug!(target_module = SOURCE, removed, "expiry sweep removed entries");
                }
            }
        })
    }

    fn lookup(&self, key: &str) -> Option<T> {
        let now = OffsetDateTime::now_utc();
        let mut entries = rw_write(&self.entries, SOURCE, "lookup");
        match entries.get_mut(key) {
            Some(entry) if entry.is_valid_at(now) => {
                entry.record_access(now);
                Some(entry.data.clone())
            }
            Some(_) => {
                entries.remove(key);
                if self.enable_metrics {
                    counter!(METRIC_STORE_EXPIRED_TOTAL).increment(1);
                }
                None
            }
            None => None,
        }
    }

    fn record_get(&self, source: &str, hit: bool, elapsed: Duration) {
        let mut stats = rw_write(&self.stats, SOURCE, "record_get");
        if hit {
            stats.record_hit(source);
        } else {
            stats.record_miss(source);
        }
        stats.record_response_time(source, elapsed.as_secs_f64() * 1000.0);
        drop(stats);

        if self.enable_metrics {
            let name = if hit {
                METRIC_STORE_HIT_TOTAL
            } else {
                METRIC_STORE_MISS_TOTAL
            };
            counter!(name, "source" => source.to_string()).increment(1);
        }
    }

    /// Batch LRU eviction: drop the oldest tenth by `last_accessed_at`,
    /// at least one entry. Amortizes sort cost over many insertions.
    fn evict_batch(&self, entries: &mut HashMap<String, CacheEntry<T>>) {
        let mut by_recency: Vec<(String, OffsetDateTime)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_accessed_at))
            .collect();
        by_recency.sort_by_key(|(_, accessed_at)| *accessed_at);

        let batch = (entries.len() / EVICTION_BATCH_DIVISOR).max(1);
        for (key, _) in by_recency.into_iter().take(batch) {
            entries.remove(&key);
        }

        debug!(target_module = SOURCE, evicted = batch, "capacity eviction");
        if self.enable_metrics {
            counter!(METRIC_STORE_EVICT_TOTAL).increment(batch as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn store_with_capacity(max_size: usize) -> CacheStore<serde_json::Value> {
        CacheStore::new(&CacheConfig {
            max_size,
            enable_metrics: false,
            ..Default::default()
        })
    }

    #[test]
    fn set_then_get_roundtrip() {
        let store = store_with_capacity(10);
        store.set("k", serde_json::json!({"x": 1}), "s", None, None);

        let value = store.get("k", "s").expect("cached value");
        assert_eq!(value, serde_json::json!({"x": 1}));
    }

    #[test]
    fn get_absent_key_is_miss() {
        let store = store_with_capacity(10);
        assert!(store.get("missing", "s").is_none());

        let stats = store.stats();
        assert_eq!(stats.total_misses, 1);
        assert_eq!(stats.total_hits, 0);
    }

    #[test]
    fn idempotent_set_keeps_second_values() {
        let store = store_with_capacity(10);
        store.set("k", serde_json::json!(1), "s", Some(Duration::from_secs(5)), None);
        store.set("k", serde_json::json!(2), "s", Some(Duration::from_secs(9)), None);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k", "s"), Some(serde_json::json!(2)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].ttl, Duration::from_secs(9));
    }

    #[test]
    fn replacement_at_capacity_does_not_evict() {
        let store = store_with_capacity(2);
        store.set("a", serde_json::json!(1), "s", None, None);
        store.set("b", serde_json::json!(2), "s", None, None);

        store.set("a", serde_json::json!(3), "s", None, None);

        assert_eq!(store.len(), 2);
        assert!(store.get("b", "s").is_some());
    }

    #[test]
    fn capacity_eviction_removes_least_recent() {
        let store = store_with_capacity(2);
        store.set("a", serde_json::json!(1), "s", None, None);
        std::thread::sleep(Duration::from_millis(5));
        store.set("b", serde_json::json!(2), "s", None, None);
        std::thread::sleep(Duration::from_millis(5));
        // Touch "a" so "b" becomes the least recently accessed
        store.get("a", "s");
        std::thread::sleep(Duration::from_millis(5));

        store.set("c", serde_json::json!(3), "s", None, None);

        assert!(store.len() <= 2);
        assert!(store.get("c", "s").is_some());
        assert!(store.get("a", "s").is_some());
        assert!(store.get("b", "s").is_none());
    }

    #[test]
    fn clear_source_scopes_removal_and_stats() {
        let store = store_with_capacity(10);
        store.set("g1", serde_json::json!(1), "github", None, None);
        store.set("l1", serde_json::json!(2), "api:leads", None, None);
        store.get("g1", "github");
        store.get("l1", "api:leads");

        store.clear_source("github");

        assert!(store.get("g1", "github").is_none());
        assert!(store.get("l1", "api:leads").is_some());

        let stats = store.stats();
        assert!(!stats.sources.contains_key("github"));
        assert!(stats.sources.contains_key("api:leads"));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = store_with_capacity(10);
        store.set("short", serde_json::json!(1), "s", Some(Duration::from_millis(10)), None);
        store.set("long", serde_json::json!(2), "s", Some(Duration::from_secs(60)), None);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("long", "s").is_some());
    }

    #[tokio::test]
    async fn fetcher_failure_is_a_miss_not_an_error() {
        let store = store_with_capacity(10);

        let value = store
            .get_or_fetch("k", "s", || async { Err("upstream exploded".into()) })
            .await;

        assert!(value.is_none());
        assert_eq!(store.stats().total_misses, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn fetcher_result_is_stored_and_returned() {
        let store = store_with_capacity(10);

        let value = store
            .get_or_fetch("k", "s", || async { Ok(Some(serde_json::json!(42))) })
            .await;

        assert_eq!(value, Some(serde_json::json!(42)));
        assert_eq!(store.get("k", "s"), Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn fetcher_none_is_not_stored() {
        let store = store_with_capacity(10);

        let value = store.get_or_fetch("k", "s", || async { Ok(None) }).await;

        assert!(value.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = store_with_capacity(10);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set("k", serde_json::json!(1), "s", None, None);
        assert!(store.get("k", "s").is_some());
    }
}
