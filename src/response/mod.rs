//! Response cache layer.
//!
//! Memoizes request/response envelopes in a remote tier keyed by
//! (endpoint, method, query fingerprint, actor identity). Supports
//! stale-while-revalidate with a deduplicated background refresh and
//! pattern-based invalidation for write-path cache busting.

mod key;
mod rules;
mod warmer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures::future::BoxFuture;
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

pub use key::{ActorScope, NO_QUERY, query_fingerprint, response_key};
pub use rules::{ResponseRule, WriteContext};
pub use warmer::{ResponseWarmer, WarmupFetch};

use crate::config::CacheConfig;
use crate::error::BoxError;
use crate::remote::RemoteTier;
use crate::telemetry::{
    METRIC_RESPONSE_HIT_TOTAL, METRIC_RESPONSE_MISS_TOTAL, METRIC_RESPONSE_REFRESH_TOTAL,
    METRIC_RESPONSE_WRITE_TOTAL,
};

const SOURCE: &str = "scorta::response";

/// Request identity attached to a cached envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub endpoint: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_fingerprint: Option<String>,
    pub payload_size: u64,
}

/// A memoized response envelope as stored in the remote tier.
///
/// Timestamps are unix milliseconds so envelopes interop with other
/// consumers of the shared tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub payload: serde_json::Value,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub cached_at: i64,
    pub expires_at: i64,
    pub meta: ResponseMeta,
}

impl CachedResponse {
    fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }

    fn in_stale_window(&self, now_ms: i64, stale_window: Duration) -> bool {
        now_ms > self.expires_at - stale_window.as_millis() as i64
    }

    fn original_ttl(&self) -> Duration {
        Duration::from_millis((self.expires_at - self.cached_at).max(0) as u64)
    }
}

/// A freshly produced response, as returned by refreshers and warmers.
#[derive(Debug, Clone)]
pub struct FreshResponse {
    pub payload: serde_json::Value,
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// Produces a fresh response for a key during background revalidation.
pub type Refresher = Arc<dyn Fn() -> BoxFuture<'static, Result<FreshResponse, BoxError>> + Send + Sync>;

/// Read options for [`ResponseCache::get`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub params: HashMap<String, String>,
    pub scope: ActorScope,
    /// Serve an expiring-soon envelope while a background refresh runs.
    pub allow_stale: bool,
}

/// Write options for [`ResponseCache::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub params: HashMap<String, String>,
    pub scope: ActorScope,
    pub ttl: Option<Duration>,
}

/// Response memoization over a shared remote tier.
///
/// The tier is a shared, multi-consumer resource this layer does not own;
/// all writes are idempotent overwrites keyed by deterministic hash, so
/// concurrent writers converge. Tier failures degrade to a miss and are
/// never surfaced to callers.
pub struct ResponseCache {
    tier: Arc<dyn RemoteTier>,
    default_ttl: Duration,
    stale_window: Duration,
    enable_metrics: bool,
    /// Keys with a background refresh in flight (the stampede guard).
    in_flight: Arc<DashSet<String>>,
    rules: Vec<ResponseRule>,
}

impl ResponseCache {
    pub fn new(tier: Arc<dyn RemoteTier>, config: &CacheConfig) -> Self {
        Self {
            tier,
            default_ttl: config.default_ttl(),
            stale_window: config.stale_window(),
            enable_metrics: config.enable_metrics,
            in_flight: Arc::new(DashSet::new()),
            rules: Vec::new(),
        }
    }

    /// Register write-path busting rules evaluated by
    /// [`ResponseCache::invalidate`].
    pub fn with_rules(mut self, rules: Vec<ResponseRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Store a response envelope. Returns false when the tier rejects the
    /// write or the envelope cannot be serialized; never errors.
    pub async fn set(
        &self,
        endpoint: &str,
        method: &str,
        payload: serde_json::Value,
        status: u16,
        headers: HashMap<String, String>,
        opts: &SetOptions,
    ) -> bool {
        let key = response_key(method, endpoint, &opts.params, &opts.scope);
        let ttl = opts.ttl.unwrap_or(self.default_ttl);
        let envelope = self.build_envelope(endpoint, method, payload, status, headers, opts, ttl);

        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    error = %error,
                    "envelope not serializable, write skipped"
                );
                return false;
            }
        };

        match self.tier.set(&key, raw, ttl).await {
            Ok(()) => {
                if self.enable_metrics {
                    counter!(METRIC_RESPONSE_WRITE_TOTAL).increment(1);
                }
                true
            }
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    error = %error,
                    "remote tier write failed"
                );
                false
            }
        }
    }

    /// Fetch a cached envelope.
    ///
    /// A fully expired entry is deleted and reported as a miss. A valid
    /// entry inside the stale-while-revalidate window is served immediately
    /// and, when the caller opted in with `allow_stale` and supplied a
    /// refresher, exactly one background refresh is scheduled for the key.
    pub async fn get(
        &self,
        endpoint: &str,
        method: &str,
        opts: &GetOptions,
        refresher: Option<Refresher>,
    ) -> Option<CachedResponse> {
        let cache_key = response_key(method, endpoint, &opts.params, &opts.scope);

        let raw = match self.tier.get(&cache_key).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    key = %cache_key,
                    error = %error,
                    "remote tier read failed"
                );
                self.record_outcome(false, "error");
                return None;
            }
        };

        let Some(raw) = raw else {
            self.record_outcome(false, "absent");
            return None;
        };

        let envelope: CachedResponse = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    key = %cache_key,
                    error = %error,
                    "dropping undecodable envelope"
                );
                self.delete_quietly(&cache_key).await;
                self.record_outcome(false, "corrupt");
                return None;
            }
        };

        let now = now_unix_ms();
        if envelope.is_expired_at(now) {
            self.delete_quietly(&cache_key).await;
            self.record_outcome(false, "expired");
            return None;
        }

        if envelope.in_stale_window(now, self.stale_window)
            && opts.allow_stale
            && let Some(refresher) = refresher
        {
            self.spawn_refresh(
                cache_key,
                refresher,
                envelope.meta.clone(),
                envelope.original_ttl(),
            );
            self.record_outcome(true, "stale");
            return Some(envelope);
        }

        self.record_outcome(true, "fresh");
        Some(envelope)
    }

    /// Evaluate busting rules against a write and delete every matching
    /// pattern family, plus the direct endpoint/method family (unscoped,
    /// per-user, per-tenant) as a conservative default.
    ///
    /// Returns the number of remote-tier keys deleted.
    pub async fn invalidate(&self, endpoint: &str, method: &str, ctx: &WriteContext) -> usize {
        let method = method.to_ascii_uppercase();
        let mut patterns = vec![format!("api:{method}:{endpoint}:*")];
        if let Some(actor) = &ctx.actor_id {
            patterns.push(format!("api:{method}:{endpoint}:*:user:{actor}"));
        }
        if let Some(tenant) = &ctx.tenant_id {
            patterns.push(format!("api:{method}:{endpoint}:*:tenant:{tenant}"));
        }

        for rule in &self.rules {
            if let Some(extra) = rule.evaluate(ctx) {
                debug!(
                    target_module = SOURCE,
                    rule = %rule.name,
                    patterns = extra.len(),
                    "busting rule matched"
                );
                patterns.extend(extra);
            }
        }
        patterns.sort();
        patterns.dedup();

        let mut removed = 0;
        for pattern in &patterns {
            match self.tier.delete_pattern(pattern).await {
                Ok(count) => removed += count,
                Err(error) => {
                    warn!(
                        target_module = SOURCE,
                        pattern = %pattern,
                        error = %error,
                        "pattern delete failed"
                    );
                }
            }
        }

        debug!(
            target_module = SOURCE,
            endpoint,
            method = %method,
            removed,
            "write-path invalidation"
        );
        removed
    }

    /// Number of keys currently being revalidated in the background.
    pub fn refreshes_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn build_envelope(
        &self,
        endpoint: &str,
        method: &str,
        payload: serde_json::Value,
        status: u16,
        headers: HashMap<String, String>,
        opts: &SetOptions,
        ttl: Duration,
    ) -> CachedResponse {
        let now = now_unix_ms();
        let payload_size = serde_json::to_vec(&payload)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);
        let (actor_id, tenant_id) = match &opts.scope {
            ActorScope::None => (None, None),
            ActorScope::User(id) => (Some(id.clone()), None),
            ActorScope::Tenant(id) => (None, Some(id.clone())),
        };
        let query_fingerprint = if opts.params.is_empty() {
            None
        } else {
            Some(query_fingerprint(&opts.params))
        };

        CachedResponse {
            payload,
            status,
            headers,
            cached_at: now,
            expires_at: now + ttl.as_millis() as i64,
            meta: ResponseMeta {
                endpoint: endpoint.to_string(),
                method: method.to_ascii_uppercase(),
                actor_id,
                tenant_id,
                query_fingerprint,
                payload_size,
            },
        }
    }

    /// Schedule a background refresh for `key` unless one is already in
    /// flight. The in-flight mark is cleared on every path, including
    /// refresher failure.
    fn spawn_refresh(&self, key: String, refresher: Refresher, meta: ResponseMeta, ttl: Duration) {
        if !self.in_flight.insert(key.clone()) {
            debug!(target_module = SOURCE, key = %key, "refresh already in flight");
            return;
        }

        let tier = self.tier.clone();
        let in_flight = self.in_flight.clone();
        let enable_metrics = self.enable_metrics;
        tokio::spawn(async move {
            match refresher().await {
                Ok(fresh) => {
                    let now = now_unix_ms();
                    let payload_size = serde_json::to_vec(&fresh.payload)
                        .map(|bytes| bytes.len() as u64)
                        .unwrap_or(0);
                    let envelope = CachedResponse {
                        payload: fresh.payload,
                        status: fresh.status,
                        headers: fresh.headers,
                        cached_at: now,
                        expires_at: now + ttl.as_millis() as i64,
                        meta: ResponseMeta {
                            payload_size,
                            ..meta
                        },
                    };
                    match serde_json::to_string(&envelope) {
                        Ok(raw) => match tier.set(&key, raw, ttl).await {
                            Ok(()) => {
                                if enable_metrics {
                                    counter!(METRIC_RESPONSE_REFRESH_TOTAL).increment(1);
                                }
                                debug!(target_module = SOURCE, key = %key, "background refresh stored");
                            }
                            Err(error) => {
                                warn!(
                                    target_module = SOURCE,
                                    key = %key,
                                    error = %error,
                                    "background refresh write failed"
                                );
                            }
                        },
                        Err(error) => {
                            warn!(
                                target_module = SOURCE,
                                key = %key,
                                error = %error,
                                "refreshed envelope not serializable"
                            );
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        target_module = SOURCE,
                        key = %key,
                        error = %error,
                        "background refresh failed"
                    );
                }
            }
            in_flight.remove(&key);
        });
    }

    async fn delete_quietly(&self, key: &str) {
        if let Err(error) = self.tier.delete(key).await {
            warn!(
                target_module = SOURCE,
                key,
                error = %error,
                "remote tier delete failed"
            );
        }
    }

    fn record_outcome(&self, hit: bool, state: &'static str) {
        if !self.enable_metrics {
            return;
        }
        let name = if hit {
            METRIC_RESPONSE_HIT_TOTAL
        } else {
            METRIC_RESPONSE_MISS_TOTAL
        };
        counter!(name, "state" => state).increment(1);
    }
}

fn now_unix_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
