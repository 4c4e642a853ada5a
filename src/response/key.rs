//! Response-cache key derivation.
//!
//! Key naming is an interop contract with any existing remote-tier data and
//! is reproduced bit-for-bit:
//!
//! ```text
//! api:{METHOD}:{endpoint}:{queryFingerprint}[:user:{id} | :tenant:{id}]
//! ```
//!
//! The fingerprint is a stable SHA-256 over the canonicalized (sorted)
//! query-parameter set, so equal parameter sets derive equal keys regardless
//! of the caller's map iteration order.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Fingerprint token used when a request carries no query parameters.
pub const NO_QUERY: &str = "no-query";

/// Hex characters of the SHA-256 digest kept in the fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Caller identity partitioning for a cached response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActorScope {
    #[default]
    None,
    User(String),
    Tenant(String),
}

/// Stable hash over the canonicalized query-parameter set.
pub fn query_fingerprint(params: &HashMap<String, String>) -> String {
    if params.is_empty() {
        return NO_QUERY.to_string();
    }

    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut canonical = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            canonical.push('&');
        }
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
    }

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Derive the remote-tier key for a request.
pub fn response_key(
    method: &str,
    endpoint: &str,
    params: &HashMap<String, String>,
    scope: &ActorScope,
) -> String {
    let mut key = format!(
        "api:{}:{}:{}",
        method.to_ascii_uppercase(),
        endpoint,
        query_fingerprint(params)
    );
    match scope {
        ActorScope::None => {}
        ActorScope::User(id) => {
            key.push_str(":user:");
            key.push_str(id);
        }
        ActorScope::Tenant(id) => {
            key.push_str(":tenant:");
            key.push_str(id);
        }
    }
    key
}
