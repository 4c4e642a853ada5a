//! Metric names and descriptions for the observable surface.
//!
//! Counters and histograms are emitted through the `metrics` facade; the
//! host application decides which recorder (if any) is installed. All
//! emission sites are gated on `CacheConfig::enable_metrics`.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

pub const METRIC_STORE_HIT_TOTAL: &str = "scorta_store_hit_total";
pub const METRIC_STORE_MISS_TOTAL: &str = "scorta_store_miss_total";
pub const METRIC_STORE_EVICT_TOTAL: &str = "scorta_store_evict_total";
pub const METRIC_STORE_EXPIRED_TOTAL: &str = "scorta_store_expired_total";
pub const METRIC_RESPONSE_HIT_TOTAL: &str = "scorta_response_hit_total";
pub const METRIC_RESPONSE_MISS_TOTAL: &str = "scorta_response_miss_total";
pub const METRIC_RESPONSE_WRITE_TOTAL: &str = "scorta_response_write_total";
pub const METRIC_RESPONSE_REFRESH_TOTAL: &str = "scorta_response_refresh_total";
pub const METRIC_INVALIDATED_TOTAL: &str = "scorta_invalidated_total";
pub const METRIC_SWEEP_MS: &str = "scorta_sweep_ms";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Register metric descriptions with the installed recorder.
///
/// Safe to call more than once; descriptions are registered a single time.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_STORE_HIT_TOTAL,
            Unit::Count,
            "Total number of in-process store hits."
        );
        describe_counter!(
            METRIC_STORE_MISS_TOTAL,
            Unit::Count,
            "Total number of in-process store misses."
        );
        describe_counter!(
            METRIC_STORE_EVICT_TOTAL,
            Unit::Count,
            "Total number of entries removed by capacity eviction."
        );
        describe_counter!(
            METRIC_STORE_EXPIRED_TOTAL,
            Unit::Count,
            "Total number of entries removed by TTL expiry."
        );
        describe_counter!(
            METRIC_RESPONSE_HIT_TOTAL,
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            METRIC_RESPONSE_MISS_TOTAL,
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            METRIC_RESPONSE_WRITE_TOTAL,
            Unit::Count,
            "Total number of response envelopes written to the remote tier."
        );
        describe_counter!(
            METRIC_RESPONSE_REFRESH_TOTAL,
            Unit::Count,
            "Total number of background stale-while-revalidate refreshes."
        );
        describe_counter!(
            METRIC_INVALIDATED_TOTAL,
            Unit::Count,
            "Total number of entries removed by invalidation rules."
        );
        describe_histogram!(
            METRIC_SWEEP_MS,
            Unit::Milliseconds,
            "Background sweep latency in milliseconds."
        );
    });
}
