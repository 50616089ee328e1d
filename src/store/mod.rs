//! Shared key-value store.
//!
//! The store is the only state shared between gateway replicas. Two concerns
//! live in it side by side:
//!
//! - circuit flags under `circuit:<instance>` (see [`crate::resilience::circuit_breaker`])
//! - cached responses under the request path (see [`crate::cache`])
//!
//! Both use plain get/set with optional expiry; no transactions. Writes are
//! idempotent and races resolve last-writer-wins.
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStore`] | Process-local LRU store with per-entry TTL |
//! | `RedisStore` | Redis-backed store shared across replicas (feature `redis`) |

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// `ttl: None` keeps the value until it is overwritten or deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    fn name(&self) -> &'static str;
}

/// Opens the store named by `redis_url`, or a [`MemoryStore`] when unset.
///
/// A Redis URL that cannot be reached (or a build without the `redis`
/// feature) falls back to the process-local store with a warning, so a
/// gateway still starts when the shared store is down.
pub async fn connect(redis_url: Option<&str>) -> std::sync::Arc<dyn SharedStore> {
    match redis_url {
        None => std::sync::Arc::new(MemoryStore::default()),
        #[cfg(feature = "redis")]
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                tracing::info!(url, "using redis shared store");
                std::sync::Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "redis unavailable, using in-memory store");
                std::sync::Arc::new(MemoryStore::default())
            }
        },
        #[cfg(not(feature = "redis"))]
        Some(url) => {
            tracing::warn!(url, "built without the redis feature, using in-memory store");
            std::sync::Arc::new(MemoryStore::default())
        }
    }
}
