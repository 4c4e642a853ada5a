//! Cache configuration.
//!
//! Controls the in-process store, the response cache, and warming behavior.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

// Default values for cache configuration
const DEFAULT_MAX_SIZE: usize = 1000;
const DEFAULT_TTL_MS: u64 = 300_000;
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;
const DEFAULT_STALE_WHILE_REVALIDATE_TTL_MS: u64 = 30_000;
const DEFAULT_WARMUP_INTERVAL_MS: u64 = 300_000;

/// Warming configuration for the response cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarmingConfig {
    /// Endpoints to proactively populate.
    pub warmup_endpoints: Vec<String>,
    /// Re-warm interval (ms).
    pub warmup_interval_ms: u64,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            warmup_endpoints: Vec::new(),
            warmup_interval_ms: DEFAULT_WARMUP_INTERVAL_MS,
        }
    }
}

/// Cache configuration from the host application's settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries in the in-process store before batch eviction.
    pub max_size: usize,
    /// TTL (ms) applied when a caller does not supply one.
    pub default_ttl_ms: u64,
    /// Interval (ms) between expiry sweeps of the in-process store.
    pub cleanup_interval_ms: u64,
    /// Emit counters/histograms through the `metrics` facade.
    pub enable_metrics: bool,
    /// Warm configured endpoints when the warmer starts.
    pub warm_up_on_startup: bool,
    /// Width (ms) of the serve-stale window before expiry.
    pub stale_while_revalidate_ttl_ms: u64,
    /// Response-cache warming settings.
    pub warming: WarmingConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl_ms: DEFAULT_TTL_MS,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            enable_metrics: true,
            warm_up_on_startup: false,
            stale_while_revalidate_ttl_ms: DEFAULT_STALE_WHILE_REVALIDATE_TTL_MS,
            warming: WarmingConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Reject zero-valued sizes and intervals.
    ///
    /// Misconfiguration is the one condition this crate reports as an error;
    /// everything at runtime degrades instead of failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroMaxSize);
        }
        if self.default_ttl_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "default_ttl_ms",
            });
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "cleanup_interval_ms",
            });
        }
        if self.warming.warmup_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "warming.warmup_interval_ms",
            });
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_while_revalidate_ttl_ms)
    }

    pub fn warmup_interval(&self) -> Duration {
        Duration::from_millis(self.warming.warmup_interval_ms)
    }

    /// Returns the store capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_size).unwrap_or(NonZeroUsize::MIN)
    }
}
