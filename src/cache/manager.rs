//! Response cache.

use super::rules::CacheRules;
use crate::store::SharedStore;
use crate::telemetry::{emit, noop_sink, EventSink, GatewayEvent};
use crate::transport::UpstreamResponse;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What is written to the store for one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats { pub hits: u64, pub misses: u64, pub stores: u64, pub errors: u64 }

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 { let total = self.hits + self.misses; if total == 0 { 0.0 } else { self.hits as f64 / total as f64 } }
}

#[derive(Default)]
struct AtomicStats { hits: AtomicU64, misses: AtomicU64, stores: AtomicU64, errors: AtomicU64 }
impl AtomicStats {
    fn to_stats(&self) -> CacheStats { CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed), stores: self.stores.load(Ordering::Relaxed), errors: self.errors.load(Ordering::Relaxed) } }
}

pub struct ResponseCache { store: Arc<dyn SharedStore>, rules: CacheRules, stats: AtomicStats, events: Arc<dyn EventSink> }

impl ResponseCache {
    pub fn new(store: Arc<dyn SharedStore>, rules: CacheRules) -> Self {
        Self { store, rules, stats: AtomicStats::default(), events: noop_sink() }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self { self.events = events; self }
    pub fn rules(&self) -> &CacheRules { &self.rules }
    pub fn stats(&self) -> CacheStats { self.stats.to_stats() }
    pub fn backend_name(&self) -> &'static str { self.store.name() }

    /// Looks `key` up. Store failures and undecodable entries count as misses.
    pub async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CachedResponse>(&raw) {
                Ok(cached) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    emit(&self.events, GatewayEvent::CacheHit { key: key.to_string() }).await;
                    Some(cached)
                }
                Err(e) => {
                    self.record_error(key, format!("undecodable entry: {}", e)).await;
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                emit(&self.events, GatewayEvent::CacheMiss { key: key.to_string() }).await;
                None
            }
            Err(e) => {
                self.record_error(key, e.to_string()).await;
                None
            }
        }
    }

    /// Stores `response` under `key` when the key is allow-listed and the
    /// status is 200. Returns whether an entry was written.
    pub async fn store(&self, key: &str, response: &UpstreamResponse) -> bool {
        if response.status != 200 {
            return false;
        }
        let Some(ttl) = self.rules.ttl_for(key) else {
            return false;
        };
        let Ok(body) = String::from_utf8(response.body.to_vec()) else {
            return false;
        };

        let entry = CachedResponse {
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            body,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                self.record_error(key, e.to_string()).await;
                return false;
            }
        };

        match self.store.set(key, &raw, Some(ttl)).await {
            Ok(()) => {
                self.stats.stores.fetch_add(1, Ordering::Relaxed);
                emit(&self.events, GatewayEvent::CacheStored { key: key.to_string(), ttl_secs: ttl.as_secs() }).await;
                true
            }
            Err(e) => {
                self.record_error(key, e.to_string()).await;
                false
            }
        }
    }

    async fn record_error(&self, key: &str, message: String) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        emit(&self.events, GatewayEvent::CacheError { key: key.to_string(), message }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::telemetry::InMemoryEventSink;
    use crate::{Error, ErrorContext, Result};
    use async_trait::async_trait;
    use std::time::Duration;

    struct BrokenStore;

    #[async_trait]
    impl SharedStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<String>> { Err(Error::store_with_context("unreachable", ErrorContext::new())) }
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<()> { Err(Error::store_with_context("unreachable", ErrorContext::new())) }
        async fn delete(&self, _: &str) -> Result<bool> { Ok(false) }
        fn name(&self) -> &'static str { "broken" }
    }

    fn cache_with(store: Arc<dyn SharedStore>) -> ResponseCache {
        ResponseCache::new(store, "/users/status=60,/game/questions=60".parse().unwrap())
    }

    fn ok_json(body: &str) -> UpstreamResponse {
        UpstreamResponse::new(200, body.to_string()).with_header("content-type", "application/json")
    }

    #[tokio::test]
    async fn test_store_then_hit() {
        let cache = cache_with(Arc::new(MemoryStore::default()));
        assert!(cache.lookup("/game/questions").await.is_none());

        assert!(cache.store("/game/questions", &ok_json(r#"[{"q":"2+2"}]"#)).await);
        let cached = cache.lookup("/game/questions").await.unwrap();
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, r#"[{"q":"2+2"}]"#);
        assert_eq!(cached.content_type.as_deref(), Some("application/json"));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.stores, stats.errors), (1, 1, 1, 0));
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[tokio::test]
    async fn test_only_allow_listed_200s_are_stored() {
        let cache = cache_with(Arc::new(MemoryStore::default()));
        assert!(!cache.store("/users/42", &ok_json("{}")).await);
        assert!(!cache.store("/users/status", &UpstreamResponse::new(201, "{}")).await);
        assert!(!cache.store("/users/status", &UpstreamResponse::new(500, "{}")).await);
        assert_eq!(cache.stats().stores, 0);
    }

    #[tokio::test]
    async fn test_store_failures_are_misses() {
        let events = Arc::new(InMemoryEventSink::default());
        let cache = cache_with(Arc::new(BrokenStore)).with_event_sink(events.clone());

        assert!(cache.lookup("/users/status").await.is_none());
        assert!(!cache.store("/users/status", &ok_json("{}")).await);
        assert_eq!(cache.stats().errors, 2);
        assert_eq!(events.events_of_kind("cache_error").len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::default());
        store.set("/users/status", "not json", None).await.unwrap();
        let cache = cache_with(store);
        assert!(cache.lookup("/users/status").await.is_none());
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_cache_traffic_never_closes_an_open_circuit() {
        use crate::registry::ServiceInstance;
        use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
        let breaker = CircuitBreaker::new(store.clone(), CircuitBreakerConfig::default());
        let instance = ServiceInstance::new("game_engine_service", "10.0.0.9", 8080);
        breaker.open(&instance).await;

        let cache = cache_with(store);
        for page in 0..10_001 {
            assert!(cache.store(&format!("/game/questions?page={}", page), &ok_json("[]")).await);
        }
        assert!(breaker.is_open(&instance).await);
    }
}
