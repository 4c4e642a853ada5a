//! Freshness rules and strategies.
//!
//! A rule is a named, pure predicate over an entry's data and metadata,
//! tied to a source tag. Strategies group rules in evaluation order; the
//! first matching rule wins per entry. Predicates must stay side-effect
//! free so sweeps can re-evaluate them safely.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::warn;

use crate::entry::Metadata;

const SOURCE: &str = "scorta::invalidation::rules";

/// Operator-facing severity. Advisory only: execution order is the
/// strategy's rule order, never priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePriority {
    Low,
    Medium,
    High,
    Critical,
}

type RuleCondition<T> = Arc<dyn Fn(&T, &Metadata) -> bool + Send + Sync>;

/// A declarative freshness rule: `condition` returning true means the
/// entry should be invalidated.
pub struct InvalidationRule<T> {
    pub name: String,
    /// Source tag the rule applies to, e.g. `"github"`.
    pub source: String,
    condition: RuleCondition<T>,
    /// Suggested replacement TTL when the rule re-classifies rather than
    /// deletes. Advisory; the current engine always deletes.
    pub ttl: Option<Duration>,
    pub priority: RulePriority,
}

impl<T> InvalidationRule<T> {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        priority: RulePriority,
        condition: impl Fn(&T, &Metadata) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            condition: Arc::new(condition),
            ttl: None,
            priority,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Evaluate the condition, isolating a panicking predicate to this
    /// rule only. Returns false when the predicate panicked.
    pub(crate) fn matches(&self, data: &T, metadata: &Metadata) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.condition)(data, metadata))) {
            Ok(matched) => matched,
            Err(_) => {
                warn!(
                    target_module = SOURCE,
                    rule = %self.name,
                    source = %self.source,
                    "rule condition panicked, skipping rule"
                );
                false
            }
        }
    }
}

impl<T> Clone for InvalidationRule<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            source: self.source.clone(),
            condition: self.condition.clone(),
            ttl: self.ttl,
            priority: self.priority,
        }
    }
}

impl<T> fmt::Debug for InvalidationRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationRule")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("ttl", &self.ttl)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A named, ordered list of rules for one freshness policy.
pub struct InvalidationStrategy<T> {
    pub name: String,
    pub description: String,
    pub rules: Vec<InvalidationRule<T>>,
    pub enabled: bool,
}

impl<T> InvalidationStrategy<T> {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rules: Vec<InvalidationRule<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rules,
            enabled: true,
        }
    }
}

impl<T> Clone for InvalidationStrategy<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            rules: self.rules.clone(),
            enabled: self.enabled,
        }
    }
}

impl<T> fmt::Debug for InvalidationStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationStrategy")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("rules", &self.rules)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Hours elapsed since the unix-seconds timestamp stored under `field`.
///
/// Returns None when the field is absent or not a number, so rules can
/// treat unknown freshness as "keep".
pub fn hours_since(metadata: &Metadata, field: &str, now: OffsetDateTime) -> Option<f64> {
    let stamp = metadata.get(field)?.as_i64()?;
    let elapsed = now.unix_timestamp() - stamp;
    Some(elapsed as f64 / 3600.0)
}

/// Built-in freshness policies restored on every process start.
///
/// All conditions are metadata-driven so scheduled sweeps can re-apply
/// them without input data.
pub fn default_strategies<T>() -> Vec<InvalidationStrategy<T>> {
    vec![
        InvalidationStrategy::new(
            "github",
            "Repository data goes stale once upstream activity outruns the cache",
            vec![
                InvalidationRule::new(
                    "repo-activity-stale",
                    "github",
                    RulePriority::High,
                    |_data: &T, metadata: &Metadata| {
                        hours_since(metadata, "updated_at", OffsetDateTime::now_utc())
                            .is_some_and(|hours| hours > 24.0)
                    },
                ),
                InvalidationRule::new(
                    "push-recency",
                    "github",
                    RulePriority::Medium,
                    |_data: &T, metadata: &Metadata| {
                        hours_since(metadata, "pushed_at", OffsetDateTime::now_utc())
                            .is_some_and(|hours| hours > 72.0)
                    },
                ),
            ],
        ),
        InvalidationStrategy::new(
            "company",
            "Company profiles are re-fetched twice a day",
            vec![InvalidationRule::new(
                "profile-refresh",
                "company",
                RulePriority::Medium,
                |_data: &T, metadata: &Metadata| {
                    hours_since(metadata, "refreshed_at", OffsetDateTime::now_utc())
                        .is_some_and(|hours| hours > 12.0)
                },
            )],
        ),
        InvalidationStrategy::new(
            "technical-data",
            "Computed aggregates are rebuilt every few hours",
            vec![InvalidationRule::new(
                "computed-aggregates",
                "technical-data",
                RulePriority::Low,
                |_data: &T, metadata: &Metadata| {
                    hours_since(metadata, "computed_at", OffsetDateTime::now_utc())
                        .is_some_and(|hours| hours > 6.0)
                },
            )],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_with_age(field: &str, hours_old: i64) -> Metadata {
        let stamp = OffsetDateTime::now_utc().unix_timestamp() - hours_old * 3600;
        Metadata::from([(field.to_string(), serde_json::json!(stamp))])
    }

    #[test]
    fn hours_since_reads_unix_seconds() {
        let metadata = metadata_with_age("updated_at", 30);
        let hours = hours_since(&metadata, "updated_at", OffsetDateTime::now_utc())
            .expect("field present");
        assert!((hours - 30.0).abs() < 0.1);
    }

    #[test]
    fn hours_since_absent_field_is_none() {
        assert!(hours_since(&Metadata::new(), "updated_at", OffsetDateTime::now_utc()).is_none());
    }

    #[test]
    fn rule_matches_on_condition() {
        let rule: InvalidationRule<serde_json::Value> = InvalidationRule::new(
            "stale-after-24h",
            "github",
            RulePriority::High,
            |_, metadata| {
                hours_since(metadata, "updated_at", OffsetDateTime::now_utc())
                    .is_some_and(|hours| hours > 24.0)
            },
        );

        assert!(rule.matches(&serde_json::Value::Null, &metadata_with_age("updated_at", 30)));
        assert!(!rule.matches(&serde_json::Value::Null, &metadata_with_age("updated_at", 1)));
    }

    #[test]
    fn panicking_condition_is_treated_as_no_match() {
        let rule: InvalidationRule<serde_json::Value> = InvalidationRule::new(
            "broken",
            "github",
            RulePriority::Low,
            |_, _| panic!("predicate bug"),
        );

        assert!(!rule.matches(&serde_json::Value::Null, &Metadata::new()));
    }

    #[test]
    fn default_strategies_cover_builtin_sources() {
        let strategies = default_strategies::<serde_json::Value>();
        let names: Vec<&str> = strategies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["github", "company", "technical-data"]);
        assert!(strategies.iter().all(|s| s.enabled));
    }

    #[test]
    fn github_default_flags_old_activity() {
        let strategies = default_strategies::<serde_json::Value>();
        let github = &strategies[0];

        let stale = metadata_with_age("updated_at", 30);
        let fresh = metadata_with_age("updated_at", 2);

        assert!(github.rules[0].matches(&serde_json::Value::Null, &stale));
        assert!(!github.rules[0].matches(&serde_json::Value::Null, &fresh));
    }
}
