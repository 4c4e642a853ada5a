//! Hit/miss accounting and rolling response-time windows.
//!
//! Per-source counters sum to the aggregate figures; `hit_rate` is 0 when
//! no gets have been recorded. Response-time samples are kept in a bounded
//! FIFO window so a long-lived store cannot grow without limit.

use std::collections::{HashMap, VecDeque};

/// Samples retained per rolling window.
const RESPONSE_TIME_WINDOW: usize = 1000;

/// Aggregate store statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: u64,
    pub total_misses: u64,
    /// hits / (hits + misses), 0.0 when no gets have been recorded.
    pub hit_rate: f64,
    pub average_response_time_ms: f64,
    /// Serialized payload size of all live entries, reporting only.
    pub estimated_bytes: u64,
    pub sources: HashMap<String, SourceStats>,
}

/// Per-source statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub average_response_time_ms: f64,
}

pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Bounded FIFO buffer of response-time samples in milliseconds.
#[derive(Debug, Default)]
pub(crate) struct RollingWindow {
    samples: VecDeque<f64>,
}

impl RollingWindow {
    pub(crate) fn record(&mut self, millis: f64) {
        if self.samples.len() == RESPONSE_TIME_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(millis);
    }

    pub(crate) fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// Mutable accounting state held by the store behind its stats lock.
#[derive(Debug, Default)]
pub(crate) struct StatsInner {
    pub(crate) overall_window: RollingWindow,
    pub(crate) sources: HashMap<String, SourceCounters>,
}

#[derive(Debug, Default)]
pub(crate) struct SourceCounters {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) window: RollingWindow,
}

impl StatsInner {
    pub(crate) fn record_hit(&mut self, source: &str) {
        self.sources.entry(source.to_string()).or_default().hits += 1;
    }

    pub(crate) fn record_miss(&mut self, source: &str) {
        self.sources.entry(source.to_string()).or_default().misses += 1;
    }

    pub(crate) fn record_response_time(&mut self, source: &str, millis: f64) {
        self.overall_window.record(millis);
        self.sources
            .entry(source.to_string())
            .or_default()
            .window
            .record(millis);
    }

    /// Drop a source bucket, removing its contribution to the aggregate.
    pub(crate) fn reset_source(&mut self, source: &str) {
        self.sources.remove(source);
    }

    pub(crate) fn reset(&mut self) {
        self.overall_window = RollingWindow::default();
        self.sources.clear();
    }

    pub(crate) fn snapshot(&self, total_entries: usize, estimated_bytes: u64) -> CacheStats {
        let mut total_hits = 0;
        let mut total_misses = 0;
        let mut sources = HashMap::with_capacity(self.sources.len());

        for (name, counters) in &self.sources {
            total_hits += counters.hits;
            total_misses += counters.misses;
            sources.insert(
                name.clone(),
                SourceStats {
                    hits: counters.hits,
                    misses: counters.misses,
                    hit_rate: hit_rate(counters.hits, counters.misses),
                    average_response_time_ms: counters.window.average(),
                },
            );
        }

        CacheStats {
            total_entries,
            total_hits,
            total_misses,
            hit_rate: hit_rate(total_hits, total_misses),
            average_response_time_ms: self.overall_window.average(),
            estimated_bytes,
            sources,
        }
    }
}
