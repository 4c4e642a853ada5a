use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use scorta::{
    CacheConfig, CacheStore, GetOptions, InvalidationEngine, MemoryTier, ResponseCache, SetOptions,
};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    scorta::telemetry::describe_metrics();

    let config = CacheConfig {
        max_size: 1,
        enable_metrics: true,
        ..Default::default()
    };

    // Store hit/miss/evict/expired + expiry sweep
    let store: CacheStore<serde_json::Value> = CacheStore::new(&config);
    assert!(store.get("absent", "github").is_none());
    store.set("a", serde_json::json!(1), "github", None, None);
    assert!(store.get("a", "github").is_some());
    store.set("b", serde_json::json!(2), "github", None, None);
    store.set(
        "c",
        serde_json::json!(3),
        "github",
        Some(Duration::from_millis(1)),
        None,
    );
    std::thread::sleep(Duration::from_millis(5));
    store.sweep_expired();

    // Response write/hit/miss
    let responses = ResponseCache::new(Arc::new(MemoryTier::new()), &config);
    responses
        .set(
            "/api/leads",
            "GET",
            serde_json::json!([1]),
            200,
            HashMap::new(),
            &SetOptions::default(),
        )
        .await;
    assert!(
        responses
            .get("/api/leads", "GET", &GetOptions::default(), None)
            .await
            .is_some()
    );
    assert!(
        responses
            .get("/api/nothing", "GET", &GetOptions::default(), None)
            .await
            .is_none()
    );

    // Rule-driven invalidation + strategy sweep
    let store = Arc::new(CacheStore::<serde_json::Value>::new(&config));
    store.set("k", serde_json::json!(1), "github", None, None);
    let engine = InvalidationEngine::new(store, &config);
    engine.invalidate_key("k");
    engine.apply_strategy("github");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "scorta_store_hit_total",
        "scorta_store_miss_total",
        "scorta_store_evict_total",
        "scorta_store_expired_total",
        "scorta_response_hit_total",
        "scorta_response_miss_total",
        "scorta_response_write_total",
        "scorta_invalidated_total",
        "scorta_sweep_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
