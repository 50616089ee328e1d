//! In-memory store backend.

use super::SharedStore;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct Entries {
    /// Entries written with a TTL; bounded, least recently used evicted first.
    expiring: LruCache<String, Entry>,
    /// Entries written without a TTL; never evicted.
    persistent: HashMap<String, String>,
}

/// Process-local store.
///
/// - Entries written with a TTL are bounded: least recently used keys are
///   evicted past capacity, expired ones are dropped lazily on read
/// - Entries written without a TTL (open circuit flags) are kept until
///   overwritten or deleted, whatever the volume of expiring traffic
///
/// Only suitable for a single gateway replica; circuit flags written here are
/// invisible to other processes.
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// `max_entries` bounds the entries written with a TTL.
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                expiring: LruCache::new(cap),
                persistent: HashMap::new(),
            }),
        }
    }

    fn poisoned() -> Error {
        Error::store_with_context(
            "memory store lock poisoned",
            ErrorContext::new().with_source("memory_store"),
        )
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        if let Some(value) = entries.persistent.get(key) {
            return Ok(Some(value.clone()));
        }
        let expired = match entries.expiring.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.expiring.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        match ttl {
            Some(ttl) => {
                entries.persistent.remove(key);
                entries.expiring.put(
                    key.to_string(),
                    Entry {
                        value: value.to_string(),
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            None => {
                entries.expiring.pop(key);
                entries
                    .persistent
                    .insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        let persistent = entries.persistent.remove(key).is_some();
        let expiring = entries
            .expiring
            .pop(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false);
        Ok(persistent || expiring)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
