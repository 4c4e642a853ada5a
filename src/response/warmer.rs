//! Proactive response-cache warming.
//!
//! Populates a configured list of known-hot endpoints on startup and on a
//! fixed interval. Warming is purely a cold-cache latency optimization:
//! failures are logged and never surfaced, and skipping warming entirely
//! has no correctness impact.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{ResponseCache, SetOptions};
use crate::config::CacheConfig;
use crate::error::BoxError;
use crate::response::FreshResponse;

const SOURCE: &str = "scorta::response::warmer";

/// Produces a fresh response for an endpoint during warming.
pub type WarmupFetch =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<FreshResponse, BoxError>> + Send + Sync>;

/// Periodic warmer for a configured endpoint list.
pub struct ResponseWarmer {
    cache: Arc<ResponseCache>,
    endpoints: Vec<String>,
    interval: Duration,
    warm_on_startup: bool,
    fetch: WarmupFetch,
}

impl ResponseWarmer {
    pub fn new(cache: Arc<ResponseCache>, config: &CacheConfig, fetch: WarmupFetch) -> Self {
        Self {
            cache,
            endpoints: config.warming.warmup_endpoints.clone(),
            interval: config.warmup_interval(),
            warm_on_startup: config.warm_up_on_startup,
            fetch,
        }
    }

    /// Fetch and store every configured endpoint once.
    ///
    /// Returns the number of endpoints successfully warmed.
    pub async fn warm_once(&self) -> usize {
        let mut warmed = 0;
        for endpoint in &self.endpoints {
            match (self.fetch)(endpoint.clone()).await {
                Ok(fresh) => {
                    let stored = self
                        .cache
                        .set(
                            endpoint,
                            "GET",
                            fresh.payload,
                            fresh.status,
                            fresh.headers,
                            &SetOptions::default(),
                        )
                        .await;
                    if stored {
                        warmed += 1;
                    }
                }
                Err(error) => {
                    warn!(
                        target_module = SOURCE,
                        endpoint = %endpoint,
                        error = %error,
                        "warmup fetch failed"
                    );
                }
            }
        }
        if warmed > 0 {
            info!(target_module = SOURCE, warmed, "cache warming pass complete");
        }
        warmed
    }

    /// Spawn the warming loop: an immediate pass when configured for
    /// startup warming, then one pass per interval. Missed ticks are
    /// skipped. Abort the handle on teardown.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.warm_on_startup {
                self.warm_once().await;
            }
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                self.warm_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::WarmingConfig;
    use crate::remote::{MemoryTier, RemoteTier};
    use crate::response::GetOptions;

    fn warming_config(endpoints: &[&str]) -> CacheConfig {
        CacheConfig {
            enable_metrics: false,
            warming: WarmingConfig {
                warmup_endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn warm_once_populates_endpoints() {
        let config = warming_config(&["/api/dashboard", "/api/leads"]);
        let tier = Arc::new(MemoryTier::new());
        let cache = Arc::new(ResponseCache::new(tier.clone(), &config));

        let fetch: WarmupFetch = Arc::new(|endpoint: String| {
            Box::pin(async move {
                Ok(FreshResponse {
                    payload: serde_json::json!({ "endpoint": endpoint }),
                    status: 200,
                    headers: HashMap::new(),
                })
            })
        });

        let warmer = ResponseWarmer::new(cache.clone(), &config, fetch);
        assert_eq!(warmer.warm_once().await, 2);

        let cached = cache
            .get("/api/dashboard", "GET", &GetOptions::default(), None)
            .await
            .expect("warmed envelope");
        assert_eq!(cached.payload["endpoint"], "/api/dashboard");
        assert_eq!(tier.get_keys("api:GET:*").await.expect("keys").len(), 2);
    }

    #[tokio::test]
    async fn warm_once_absorbs_fetch_failures() {
        let config = warming_config(&["/api/broken", "/api/ok"]);
        let cache = Arc::new(ResponseCache::new(Arc::new(MemoryTier::new()), &config));

        let calls = Arc::new(AtomicUsize::new(0));
        let observed = calls.clone();
        let fetch: WarmupFetch = Arc::new(move |endpoint: String| {
            observed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if endpoint.contains("broken") {
                    Err("upstream down".into())
                } else {
                    Ok(FreshResponse {
                        payload: serde_json::Value::Null,
                        status: 200,
                        headers: HashMap::new(),
                    })
                }
            })
        });

        let warmer = ResponseWarmer::new(cache, &config, fetch);
        assert_eq!(warmer.warm_once().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
