//! Remote-tier backend contract.
//!
//! The response cache delegates storage to a shared, possibly multi-consumer
//! backend (Redis-compatible in production) reachable through this minimal
//! trait. Values are opaque serialized payloads and round-trip exactly.
//! Writes are idempotent overwrites; last write wins.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryTier;

#[derive(Debug, Error)]
pub enum RemoteTierError {
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("backend operation failed: {message}")]
    Operation { message: String },
}

impl RemoteTierError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub response_time: Duration,
}

/// Minimal get/set/delete/clear/pattern-delete contract for a shared
/// cache backend.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteTierError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteTierError>;

    /// Returns true when the key existed.
    async fn delete(&self, key: &str) -> Result<bool, RemoteTierError>;

    /// Delete every key matching a glob-like pattern (`*` wildcard).
    /// Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, RemoteTierError>;

    async fn clear(&self) -> Result<(), RemoteTierError>;

    async fn get_keys(&self, pattern: &str) -> Result<Vec<String>, RemoteTierError>;

    async fn health_check(&self) -> HealthReport;
}

/// Glob-like matching with `*` as the only wildcard, as accepted by
/// `delete_pattern` and `get_keys`.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    fn inner(pattern: &[u8], candidate: &[u8]) -> bool {
        match (pattern.first(), candidate.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], candidate)
                    || (!candidate.is_empty() && inner(pattern, &candidate[1..]))
            }
            (Some(p), Some(c)) if p == c => inner(&pattern[1..], &candidate[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), candidate.as_bytes())
}
