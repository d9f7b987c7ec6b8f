//! Short-lived verification cache.
//!
//! Keyed by a fingerprint of the raw token so repeated requests from the same
//! widget within a short window skip the decode/HMAC round. This is the only
//! in-process mutable state besides the connection pool; all tenant state
//! lives in the store.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::VerifiedInstance;

/// Entries are pruned opportunistically once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

struct CacheEntry {
    verified: VerifiedInstance,
    expires_at: Instant,
}

static CACHE: Lazy<RwLock<HashMap<String, CacheEntry>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Fingerprint of a raw token. The token itself is never used as a map key.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn lookup(fingerprint: &str) -> Option<VerifiedInstance> {
    let cache = CACHE.read().ok()?;
    let entry = cache.get(fingerprint)?;
    if entry.expires_at <= Instant::now() {
        return None;
    }
    Some(entry.verified.clone())
}

pub fn store(fingerprint: String, verified: VerifiedInstance, ttl_secs: u64) {
    if ttl_secs == 0 {
        return;
    }
    let Ok(mut cache) = CACHE.write() else {
        return;
    };
    let now = Instant::now();
    if cache.len() >= PRUNE_THRESHOLD {
        cache.retain(|_, entry| entry.expires_at > now);
    }
    cache.insert(
        fingerprint,
        CacheEntry {
            verified,
            expires_at: now + Duration::from_secs(ttl_secs),
        },
    );
}
