//! Write-path busting rules for the response cache.
//!
//! Rules are code, not config: each carries a predicate over the write
//! context and a pattern generator for the extra remote-tier families to
//! delete when it matches.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::entry::Metadata;

const SOURCE: &str = "scorta::response::rules";

/// Context of a write operation handed to `ResponseCache::invalidate`.
#[derive(Debug, Clone, Default)]
pub struct WriteContext {
    pub status: u16,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub metadata: Metadata,
}

type RuleMatch = Arc<dyn Fn(&WriteContext) -> bool + Send + Sync>;
type RulePatterns = Arc<dyn Fn(&WriteContext) -> Vec<String> + Send + Sync>;

/// A named busting rule: when `matches` holds for a write, every pattern
/// from `patterns` is deleted from the remote tier.
#[derive(Clone)]
pub struct ResponseRule {
    pub name: String,
    matches: RuleMatch,
    patterns: RulePatterns,
}

impl ResponseRule {
    pub fn new(
        name: impl Into<String>,
        matches: impl Fn(&WriteContext) -> bool + Send + Sync + 'static,
        patterns: impl Fn(&WriteContext) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            matches: Arc::new(matches),
            patterns: Arc::new(patterns),
        }
    }

    /// Evaluate the rule, isolating a panicking predicate to this rule only.
    pub(crate) fn evaluate(&self, ctx: &WriteContext) -> Option<Vec<String>> {
        let matched = match catch_unwind(AssertUnwindSafe(|| (self.matches)(ctx))) {
            Ok(matched) => matched,
            Err(_) => {
                warn!(
                    target_module = SOURCE,
                    rule = %self.name,
                    "rule predicate panicked, skipping rule"
                );
                return None;
            }
        };
        if !matched {
            return None;
        }
        match catch_unwind(AssertUnwindSafe(|| (self.patterns)(ctx))) {
            Ok(patterns) => Some(patterns),
            Err(_) => {
                warn!(
                    target_module = SOURCE,
                    rule = %self.name,
                    "rule pattern generator panicked, skipping rule"
                );
                None
            }
        }
    }
}

impl fmt::Debug for ResponseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
