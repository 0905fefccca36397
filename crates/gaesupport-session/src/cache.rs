//! Key-value cache port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Distributed key-value cache holding session payloads.
///
/// Callers treat any error as a cache miss; implementations do not retry.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Fetch a value. `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value that expires after `ttl`. Returns whether it was stored.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Remove a value. Returns whether the key existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Release the connection. Later calls may reconnect.
    async fn close(&self) -> CacheResult<bool>;
}

/// Shared cache handle.
pub type SharedCache = Arc<dyn CacheClient>;
