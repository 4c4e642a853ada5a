//! Scorta Caching Engine
//!
//! Provides three cooperating layers for in-process caching:
//!
//! - **Store**: a generic key→value cache with per-entry TTL, batch LRU
//!   eviction, and per-source hit/miss statistics
//! - **Response cache**: memoizes request/response envelopes in a pluggable
//!   remote tier, with stale-while-revalidate and pattern invalidation
//! - **Invalidation engine**: rule-driven freshness policies applied on
//!   demand and on hourly/daily background sweeps
//!
//! ## Configuration
//!
//! Cache behavior is controlled via [`CacheConfig`], which deserializes from
//! the host application's settings file:
//!
//! ```toml
//! [cache]
//! max_size = 1000
//! default_ttl_ms = 300000
//! cleanup_interval_ms = 60000
//! # ... see config.rs for all options
//! ```
//!
//! ## Failure policy
//!
//! Nothing in this crate surfaces a runtime error to callers who merely
//! wanted cached-or-computed data: fetcher failures, remote-tier outages,
//! and bad rules are logged and absorbed, and the cache degrades to
//! recomputation. The only fallible surface is configuration validation at
//! construction time.

pub mod config;
pub mod entry;
pub mod error;
pub mod invalidation;
mod lock;
pub mod remote;
pub mod response;
pub mod stats;
pub mod store;
pub mod telemetry;

pub use config::{CacheConfig, WarmingConfig};
pub use entry::{CacheEntry, Metadata};
pub use error::{BoxError, ConfigError};
pub use invalidation::{
    InvalidationEngine, InvalidationRule, InvalidationStrategy, RulePriority, ScheduleHandles,
    SweepSchedule,
};
pub use remote::{HealthReport, HealthStatus, MemoryTier, RemoteTier, RemoteTierError};
pub use response::{
    ActorScope, CachedResponse, FreshResponse, GetOptions, Refresher, ResponseCache, ResponseMeta,
    ResponseRule, ResponseWarmer, SetOptions, WarmupFetch, WriteContext,
};
pub use stats::{CacheStats, SourceStats};
pub use store::{CacheStore, EntrySnapshot};
