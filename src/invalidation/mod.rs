//! Rule-driven invalidation over the in-process store.
//!
//! The engine owns a registry of [`InvalidationStrategy`] values and applies
//! them against store snapshots: entries whose source matches a rule and
//! whose condition fires are deleted. Scheduled sweeps (see
//! [`ScheduleHandles`]) run the same passes on hourly and daily cadences.

mod rules;
mod schedule;

pub use rules::{
    InvalidationRule, InvalidationStrategy, RulePriority, default_strategies, hours_since,
};
pub use schedule::{ScheduleHandles, SweepSchedule};

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::entry::ttl_as_time;
use crate::lock::{rw_read, rw_write};
use crate::store::CacheStore;
use crate::telemetry::{METRIC_INVALIDATED_TOTAL, METRIC_SWEEP_MS};

const SOURCE: &str = "scorta::invalidation";

/// Applies freshness strategies to a [`CacheStore`].
///
/// The strategy registry is independent of the store's own TTLs: a rule can
/// remove an entry well before its TTL would, never after a read already
/// dropped it.
pub struct InvalidationEngine<T> {
    store: Arc<CacheStore<T>>,
    strategies: RwLock<Vec<InvalidationStrategy<T>>>,
    enable_metrics: bool,
}

impl<T: Clone> InvalidationEngine<T> {
    /// Engine over `store` seeded with the built-in strategies.
    pub fn new(store: Arc<CacheStore<T>>, config: &CacheConfig) -> Self {
        Self::with_strategies(store, config, default_strategies())
    }

    pub fn with_strategies(
        store: Arc<CacheStore<T>>,
        config: &CacheConfig,
        strategies: Vec<InvalidationStrategy<T>>,
    ) -> Self {
        Self {
            store,
            strategies: RwLock::new(strategies),
            enable_metrics: config.enable_metrics,
        }
    }

    /// Run one named strategy over the current store contents.
    ///
    /// Within a strategy the first matching rule claims the entry; later
    /// rules are not consulted for it. A disabled or unknown strategy is a
    /// no-op. Returns the number of entries removed.
    pub fn apply_strategy(&self, name: &str) -> usize {
        let strategy = {
            let strategies = rw_read(&self.strategies, SOURCE, "apply_strategy");
            match strategies.iter().find(|s| s.name == name) {
                Some(strategy) if strategy.enabled => strategy.clone(),
                Some(_) => {
                    debug!(target_module = SOURCE, strategy = name, "strategy disabled, skipping");
                    return 0;
                }
                None => {
                    debug!(target_module = SOURCE, strategy = name, "unknown strategy");
                    return 0;
                }
            }
        };

        let sweep_started_at = Instant::now();
        let mut removed = 0usize;

        for entry in self.store.snapshot() {
            let matched = strategy.rules.iter().find(|rule| {
                rule.source == entry.source && rule.matches(&entry.data, &entry.metadata)
            });
            if let Some(rule) = matched {
                if self.store.delete(&entry.key) {
                    removed += 1;
                    debug!(
                        target_module = SOURCE,
                        key = %entry.key,
                        rule = %rule.name,
                        priority = ?rule.priority,
                        suggested_ttl_ms = rule.ttl.map(|ttl| ttl.as_millis() as u64),
                        "rule invalidated entry"
                    );
                }
            }
        }

        if removed > 0 {
            info!(
                target_module = SOURCE,
                strategy = name,
                removed,
                "strategy sweep removed entries"
            );
        }
        if self.enable_metrics {
            if removed > 0 {
                counter!(METRIC_INVALIDATED_TOTAL, "strategy" => name.to_string())
                    .increment(removed as u64);
            }
            histogram!(METRIC_SWEEP_MS, "sweep" => "strategy")
                .record(sweep_started_at.elapsed().as_secs_f64() * 1000.0);
        }
        removed
    }

    /// Run every enabled strategy once. Returns total entries removed.
    pub fn apply_all_enabled(&self) -> usize {
        let names: Vec<String> = rw_read(&self.strategies, SOURCE, "apply_all_enabled")
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect();

        names.iter().map(|name| self.apply_strategy(name)).sum()
    }

    /// Delete every entry whose key contains `pattern`, optionally limited
    /// to one source. Returns the number removed.
    pub fn invalidate_by_pattern(&self, pattern: &str, source: Option<&str>) -> usize {
        let mut removed = 0usize;
        for entry in self.store.snapshot() {
            if let Some(wanted) = source
                && entry.source != wanted
            {
                continue;
            }
            if entry.key.contains(pattern) && self.store.delete(&entry.key) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                target_module = SOURCE,
                pattern,
                source,
                removed,
                "pattern invalidation removed entries"
            );
            if self.enable_metrics {
                counter!(METRIC_INVALIDATED_TOTAL, "strategy" => "pattern")
                    .increment(removed as u64);
            }
        }
        removed
    }

    /// Delete one exact key. Returns whether it existed.
    pub fn invalidate_key(&self, key: &str) -> bool {
        let removed = self.store.delete(key);
        if removed && self.enable_metrics {
            counter!(METRIC_INVALIDATED_TOTAL, "strategy" => "key").increment(1);
        }
        removed
    }

    /// Delete entries not accessed within `max_idle`. Returns the number
    /// removed.
    pub fn inactivity_sweep(&self, max_idle: Duration) -> usize {
        let sweep_started_at = Instant::now();
        let now = OffsetDateTime::now_utc();
        let cutoff = ttl_as_time(max_idle);

        let mut removed = 0usize;
        for entry in self.store.snapshot() {
            if now - entry.last_accessed_at > cutoff && self.store.delete(&entry.key) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                target_module = SOURCE,
                removed,
                max_idle_secs = max_idle.as_secs(),
                "inactivity sweep removed entries"
            );
        }
        if self.enable_metrics {
            if removed > 0 {
                counter!(METRIC_INVALIDATED_TOTAL, "strategy" => "inactivity")
                    .increment(removed as u64);
            }
            histogram!(METRIC_SWEEP_MS, "sweep" => "inactivity")
                .record(sweep_started_at.elapsed().as_secs_f64() * 1000.0);
        }
        removed
    }

    pub fn add_strategy(&self, strategy: InvalidationStrategy<T>) {
        rw_write(&self.strategies, SOURCE, "add_strategy").push(strategy);
    }

    /// Remove a strategy by name. Returns whether it existed.
    pub fn remove_strategy(&self, name: &str) -> bool {
        let mut strategies = rw_write(&self.strategies, SOURCE, "remove_strategy");
        let before = strategies.len();
        strategies.retain(|s| s.name != name);
        strategies.len() != before
    }

    /// Enable or disable a strategy by name. Returns whether it existed.
    pub fn set_strategy_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut strategies = rw_write(&self.strategies, SOURCE, "set_strategy_enabled");
        match strategies.iter_mut().find(|s| s.name == name) {
            Some(strategy) => {
                strategy.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Registered strategy names with their enabled flags, in registry order.
    pub fn strategy_names(&self) -> Vec<(String, bool)> {
        rw_read(&self.strategies, SOURCE, "strategy_names")
            .iter()
            .map(|s| (s.name.clone(), s.enabled))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_store() -> (Arc<CacheStore<serde_json::Value>>, InvalidationEngine<serde_json::Value>) {
        let config = CacheConfig {
            enable_metrics: false,
            ..Default::default()
        };
        let store = Arc::new(CacheStore::new(&config));
        let engine = InvalidationEngine::new(store.clone(), &config);
        (store, engine)
    }

    fn stamped_metadata(field: &str, hours_old: i64) -> crate::entry::Metadata {
        let stamp = OffsetDateTime::now_utc().unix_timestamp() - hours_old * 3600;
        crate::entry::Metadata::from([(field.to_string(), serde_json::json!(stamp))])
    }

    #[test]
    fn github_strategy_removes_only_stale_entries() {
        let (store, engine) = engine_with_store();
        store.set(
            "github:stale-repo",
            serde_json::json!({"name": "stale"}),
            "github",
            None,
            Some(stamped_metadata("updated_at", 30)),
        );
        store.set(
            "github:fresh-repo",
            serde_json::json!({"name": "fresh"}),
            "github",
            None,
            Some(stamped_metadata("updated_at", 2)),
        );
        store.set(
            "company:acme",
            serde_json::json!({"name": "acme"}),
            "company",
            None,
            Some(stamped_metadata("updated_at", 30)),
        );

        assert_eq!(engine.apply_strategy("github"), 1);
        assert!(store.get("github:stale-repo", "github").is_none());
        assert!(store.get("github:fresh-repo", "github").is_some());
        // Different source is out of scope even with matching metadata
        assert!(store.get("company:acme", "company").is_some());
    }

    #[test]
    fn disabled_strategy_is_a_no_op() {
        let (store, engine) = engine_with_store();
        store.set(
            "github:stale",
            serde_json::json!(1),
            "github",
            None,
            Some(stamped_metadata("updated_at", 48)),
        );

        assert!(engine.set_strategy_enabled("github", false));
        assert_eq!(engine.apply_strategy("github"), 0);
        assert_eq!(store.len(), 1);

        assert!(engine.set_strategy_enabled("github", true));
        assert_eq!(engine.apply_strategy("github"), 1);
    }

    #[test]
    fn unknown_strategy_returns_zero() {
        let (_store, engine) = engine_with_store();
        assert_eq!(engine.apply_strategy("does-not-exist"), 0);
    }

    #[test]
    fn panicking_rule_does_not_block_later_rules() {
        let config = CacheConfig {
            enable_metrics: false,
            ..Default::default()
        };
        let store = Arc::new(CacheStore::new(&config));
        let strategy = InvalidationStrategy::new(
            "custom",
            "panicking first rule",
            vec![
                InvalidationRule::new("broken", "custom", RulePriority::High, |_: &serde_json::Value, _| {
                    panic!("predicate bug")
                }),
                InvalidationRule::new("always", "custom", RulePriority::Low, |_: &serde_json::Value, _| true),
            ],
        );
        let engine = InvalidationEngine::with_strategies(store.clone(), &config, vec![strategy]);

        store.set("custom:x", serde_json::json!(1), "custom", None, None);

        assert_eq!(engine.apply_strategy("custom"), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn pattern_invalidation_honors_source_filter() {
        let (store, engine) = engine_with_store();
        store.set("api:GET:/api/leads:aa", serde_json::json!(1), "api:leads", None, None);
        store.set("api:GET:/api/leads:bb", serde_json::json!(2), "api:leads", None, None);
        store.set("api:GET:/api/companies:cc", serde_json::json!(3), "api:companies", None, None);

        assert_eq!(engine.invalidate_by_pattern("/api/leads", Some("api:leads")), 2);
        assert_eq!(engine.invalidate_by_pattern("/api/", Some("api:leads")), 0);
        assert_eq!(engine.invalidate_by_pattern("/api/", None), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn invalidate_key_reports_existence() {
        let (store, engine) = engine_with_store();
        store.set("k", serde_json::json!(1), "s", None, None);

        assert!(engine.invalidate_key("k"));
        assert!(!engine.invalidate_key("k"));
        assert!(store.is_empty());
    }

    #[test]
    fn inactivity_sweep_keeps_recently_read_entries() {
        let (store, engine) = engine_with_store();
        store.set("idle", serde_json::json!(1), "s", None, None);
        store.set("busy", serde_json::json!(2), "s", None, None);

        std::thread::sleep(Duration::from_millis(30));
        store.get("busy", "s");

        assert_eq!(engine.inactivity_sweep(Duration::from_millis(20)), 1);
        assert!(store.get("idle", "s").is_none());
        assert!(store.get("busy", "s").is_some());
    }

    #[test]
    fn registry_add_remove_and_list() {
        let (_store, engine) = engine_with_store();
        engine.add_strategy(InvalidationStrategy::new("custom", "test strategy", vec![]));

        let names: Vec<String> = engine.strategy_names().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["github", "company", "technical-data", "custom"]);

        assert!(engine.remove_strategy("custom"));
        assert!(!engine.remove_strategy("custom"));
        assert_eq!(engine.strategy_names().len(), 3);
    }
}
