//! Key-value cache abstraction with TTL.
//!
//! The cache is a latency optimisation only: every cached value can be
//! re-derived from the git host. Write failures are logged and ignored by
//! callers via [`cache_put`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::domain::error::Result;
use crate::metrics::METRICS;
use crate::obs;

/// Prefix applied to every key written through [`cache_put`] / [`cache_get`].
pub const KEY_PREFIX: &str = "armportal:";

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Typed read. Misses, read errors and undecodable entries all count as a miss.
pub async fn cache_get<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let full = format!("{KEY_PREFIX}{key}");
    let value = match cache.get(&full).await {
        Ok(Some(v)) => v,
        Ok(None) => {
            METRICS.inc_cache_misses();
            return None;
        }
        Err(e) => {
            tracing::debug!(key = %full, error = %e, "cache read failed");
            METRICS.inc_cache_misses();
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(v) => {
            METRICS.inc_cache_hits();
            Some(v)
        }
        Err(_) => {
            METRICS.inc_cache_misses();
            None
        }
    }
}

/// Best-effort typed write.
pub async fn cache_put<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    let full = format!("{KEY_PREFIX}{key}");
    let result = match serde_json::to_value(value) {
        Ok(v) => cache.set(&full, v, ttl).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        obs::emit_cache_write_failed(&full, &e);
    }
}

/// Best-effort delete.
pub async fn cache_evict(cache: &dyn Cache, key: &str) {
    let full = format!("{KEY_PREFIX}{key}");
    if let Err(e) = cache.delete(&full).await {
        obs::emit_cache_write_failed(&full, &e);
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// In-process cache backed by a `HashMap<key, (value, expiry)>`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (serde_json::Value, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> crate::domain::error::PortalError {
    crate::domain::error::PortalError::unexpected("cache lock poisoned")
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        match entries.get(key) {
            Some((_, expiry)) if *expiry <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}
