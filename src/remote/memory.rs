//! In-memory reference implementation of the remote-tier contract.
//!
//! Used by tests and by hosts that want the response cache without a real
//! distributed backend. Size-bounded by strict LRU; TTL enforced on read.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use time::OffsetDateTime;

use super::{HealthReport, HealthStatus, RemoteTier, RemoteTierError, glob_match};
use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "scorta::remote::memory";

const DEFAULT_CAPACITY: usize = 1024;

struct StoredValue {
    value: String,
    expires_at: OffsetDateTime,
}

/// Bounded in-memory tier with the same observable semantics as a real
/// remote backend: opaque string payloads, TTL on read, wildcard deletes.
pub struct MemoryTier {
    values: RwLock<LruCache<String, StoredValue>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            values: RwLock::new(LruCache::new(capacity)),
        }
    }

    fn matching_keys(&self, pattern: &str) -> Vec<String> {
        rw_read(&self.values, SOURCE, "matching_keys")
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTier for MemoryTier {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteTierError> {
        let now = OffsetDateTime::now_utc();
        let mut values = rw_write(&self.values, SOURCE, "get");
        match values.get(key) {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.value.clone())),
            Some(_) => {
                values.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteTierError> {
        let expires_at = OffsetDateTime::now_utc()
            + time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        rw_write(&self.values, SOURCE, "set").put(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RemoteTierError> {
        Ok(rw_write(&self.values, SOURCE, "delete").pop(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, RemoteTierError> {
        let keys = self.matching_keys(pattern);
        let mut values = rw_write(&self.values, SOURCE, "delete_pattern");
        let mut removed = 0;
        for key in keys {
            if values.pop(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), RemoteTierError> {
        rw_write(&self.values, SOURCE, "clear").clear();
        Ok(())
    }

    async fn get_keys(&self, pattern: &str) -> Result<Vec<String>, RemoteTierError> {
        Ok(self.matching_keys(pattern))
    }

    async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let _len = rw_read(&self.values, SOURCE, "health_check").len();
        HealthReport {
            status: HealthStatus::Healthy,
            response_time: started.elapsed(),
        }
    }
}
