//! Cache entry model.
//!
//! A [`CacheEntry`] carries its own TTL and access-tracking fields so the
//! store, the sweeps, and the invalidation rules all reason about the same
//! record.

use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;

/// Opaque key/value bag attached to an entry for rule evaluation.
///
/// Timestamps stored here for freshness rules use unix seconds as JSON
/// numbers (see [`crate::invalidation::hours_since`]).
pub type Metadata = HashMap<String, serde_json::Value>;

/// A single cached record owned by a [`crate::store::CacheStore`].
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// String identity, unique within a store.
    pub key: String,
    pub data: T,
    pub created_at: OffsetDateTime,
    pub ttl: Duration,
    /// Tag identifying the producing subsystem, e.g. `"github"` or
    /// `"api:leads"`. Drives per-source stats and strategy scoping.
    pub source: String,
    pub access_count: u64,
    pub last_accessed_at: OffsetDateTime,
    pub metadata: Metadata,
    /// Serialized payload length, reporting only. Never drives eviction.
    pub(crate) size_bytes: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(
        key: impl Into<String>,
        data: T,
        source: impl Into<String>,
        ttl: Duration,
        metadata: Metadata,
        size_bytes: u64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            key: key.into(),
            data,
            created_at: now,
            ttl,
            source: source.into(),
            access_count: 0,
            last_accessed_at: now,
            metadata,
            size_bytes,
        }
    }

    /// An entry is valid iff `now - created_at < ttl`.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now - self.created_at < ttl_as_time(self.ttl)
    }

    /// Time since the entry was last read.
    pub fn idle_for(&self, now: OffsetDateTime) -> Duration {
        let idle = now - self.last_accessed_at;
        if idle.is_negative() {
            Duration::ZERO
        } else {
            idle.unsigned_abs()
        }
    }

    pub(crate) fn record_access(&mut self, now: OffsetDateTime) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }
}

pub(crate) fn ttl_as_time(ttl: Duration) -> time::Duration {
    time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_ttl(ttl: Duration) -> CacheEntry<u32> {
        CacheEntry::new("k", 1, "test", ttl, Metadata::new(), 0)
    }

    #[test]
    fn fresh_entry_is_valid() {
        let entry = entry_with_ttl(Duration::from_secs(60));
        assert!(entry.is_valid_at(OffsetDateTime::now_utc()));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let entry = entry_with_ttl(Duration::from_millis(100));
        let later = entry.created_at + time::Duration::milliseconds(101);
        assert!(!entry.is_valid_at(later));
    }

    #[test]
    fn entry_valid_just_under_ttl() {
        let entry = entry_with_ttl(Duration::from_millis(100));
        let later = entry.created_at + time::Duration::milliseconds(99);
        assert!(entry.is_valid_at(later));
    }

    #[test]
    fn access_bumps_counter_and_timestamp() {
        let mut entry = entry_with_ttl(Duration::from_secs(60));
        let before = entry.last_accessed_at;
        let later = before + time::Duration::seconds(5);

        entry.record_access(later);

        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed_at, later);
        assert_eq!(entry.idle_for(later + time::Duration::seconds(3)).as_secs(), 3);
    }
}
