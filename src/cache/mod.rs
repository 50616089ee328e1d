//! Response caching for idempotent reads.
//!
//! Only `GET` requests whose path is on the allow-list are cached, and only
//! when the backend answered `200`. Entries live in the [`SharedStore`] under
//! the request path (including any query string), so every replica shares
//! them.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Lookup/store with statistics and event reporting |
//! | [`CacheRules`] | Allow-list of cacheable paths and their TTLs |
//! | [`CachedResponse`] | Serialized form of a stored response |
//! | [`CacheStats`] | Hit/miss/store/error counters |
//!
//! A cache failure is never fatal: a failed lookup is a miss, a failed store
//! is skipped.
//!
//! ## Example
//!
//! ```rust
//! use service_gateway::cache::{CacheRules, ResponseCache};
//! use service_gateway::store::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let rules: CacheRules = "/users/status=60,/game/questions=120".parse().unwrap();
//! assert_eq!(rules.ttl_for("/game/questions?level=2"), Some(Duration::from_secs(120)));
//!
//! let cache = ResponseCache::new(Arc::new(MemoryStore::default()), rules);
//! assert_eq!(cache.stats().hits, 0);
//! ```
//!
//! [`SharedStore`]: crate::store::SharedStore

mod manager;
mod rules;

pub use manager::{CacheStats, CachedResponse, ResponseCache};
pub use rules::{CacheRule, CacheRules, DEFAULT_RULES};
