//! The gateway core: every inbound request the server accepts ends up here.
//!
//! A [`Gateway`] owns one instance of each routing component, wired the
//! same way for every request:
//!
//! ```text
//! route(request)
//!   ├─ GET and cached?  → answer from the response cache
//!   └─ RedirectEngine   → registry → InstanceSelector → RetryEngine → Upstream
//!                                          ▲                 │
//!                                          └── CircuitBreaker ┘ (shared store)
//! ```
//!
//! Build one with [`GatewayBuilder`].

mod builder;

pub use builder::GatewayBuilder;

use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatch, RedirectEngine, ServiceRequest};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::rate_limiter::RateLimiter;
use crate::routing::InstanceSelector;
use crate::saga::user_game::{GAME_SERVICE, USER_SERVICE};
use crate::telemetry::EventSink;
use crate::transport::UpstreamResponse;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Path prefixes and the service that owns them.
const ROUTES: &[(&str, &str)] = &[("/users", USER_SERVICE), ("/game", GAME_SERVICE)];

/// Service that owns `path`, matched on whole leading segments.
///
/// `/users` and `/users/42` route to the user service; `/usersx` routes
/// nowhere.
pub fn service_for_path(path: &str) -> Option<&'static str> {
    let path = path.split('?').next().unwrap_or(path);
    ROUTES.iter().find_map(|(prefix, service)| {
        let rest = path.strip_prefix(prefix)?;
        (rest.is_empty() || rest.starts_with('/')).then_some(*service)
    })
}

pub struct Gateway {
    pub(crate) config: GatewayConfig,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) selector: Arc<InstanceSelector>,
    pub(crate) redirect: Arc<RedirectEngine>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) rate_limiter: Option<Arc<RateLimiter>>,
    pub(crate) events: Arc<dyn EventSink>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn selector(&self) -> &Arc<InstanceSelector> {
        &self.selector
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Answers `request` from the cache when possible, otherwise routes it
    /// through the redirect engine.
    ///
    /// Only allow-listed GETs consult the cache. A cache hit never touches
    /// the registry or any instance.
    pub async fn route(&self, request: &ServiceRequest) -> Result<UpstreamResponse> {
        if request.is_get() && self.cache.rules().ttl_for(&request.path).is_some() {
            if let Some(cached) = self.cache.lookup(&request.path).await {
                let mut response = UpstreamResponse::new(cached.status, cached.body);
                if let Some(content_type) = cached.content_type {
                    response = response.with_header("content-type", content_type);
                }
                return Ok(response);
            }
        }
        self.redirect.dispatch(request).await
    }

    /// Runs the user-and-game saga. Returns `(user_id, game_id)`.
    ///
    /// Saga steps bypass the response cache; they go straight to the
    /// redirect engine.
    pub async fn create_user_with_game(&self, user: Value) -> Result<(String, String)> {
        let dispatcher: Arc<dyn Dispatch> = self.redirect.clone();
        crate::saga::create_user_with_game(dispatcher, self.events.clone(), user).await
    }
}

#[async_trait]
impl Dispatch for Gateway {
    async fn dispatch(&self, request: &ServiceRequest) -> Result<UpstreamResponse> {
        self.route(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{Scripted, ScriptedUpstream};
    use crate::registry::InMemoryRegistry;
    use crate::resilience::circuit_breaker::CircuitKeyMode;
    use crate::store::MemoryStore;
    use crate::telemetry::InMemoryEventSink;
    use serde_json::json;

    struct Fixture {
        gateway: Gateway,
        upstream: Arc<ScriptedUpstream>,
        events: Arc<InMemoryEventSink>,
    }

    async fn fixture(instances: &[(&str, u16)]) -> Fixture {
        let registry = Arc::new(InMemoryRegistry::new());
        for (name, port) in instances {
            registry.register(name, "10.0.0.1", *port).unwrap();
        }
        let upstream = Arc::new(ScriptedUpstream::default());
        let events = Arc::new(InMemoryEventSink::default());
        let gateway = Gateway::builder()
            .with_config(
                GatewayConfig::default()
                    .with_max_retries(1)
                    .with_circuit_key(CircuitKeyMode::Address),
            )
            .with_store(Arc::new(MemoryStore::default()))
            .with_registry(registry)
            .with_upstream(upstream.clone())
            .with_event_sink(events.clone())
            .build()
            .unwrap();
        Fixture {
            gateway,
            upstream,
            events,
        }
    }

    #[test]
    fn test_service_for_path() {
        assert_eq!(service_for_path("/users"), Some(USER_SERVICE));
        assert_eq!(service_for_path("/users/42"), Some(USER_SERVICE));
        assert_eq!(service_for_path("/game/questions?x=1"), Some(GAME_SERVICE));
        assert_eq!(service_for_path("/gamers"), None);
        assert_eq!(service_for_path("/status"), None);
    }

    #[tokio::test]
    async fn test_cacheable_get_is_served_from_cache_the_second_time() {
        let f = fixture(&[(GAME_SERVICE, 8001)]).await;
        f.upstream
            .script("10.0.0.1:8001", vec![Scripted::Status(200, r#"{"q":[1]}"#)]);

        let request = ServiceRequest::get(GAME_SERVICE, "/game/questions");
        let first = f.gateway.route(&request).await.unwrap();
        let second = f.gateway.route(&request).await.unwrap();

        assert_eq!(first.text(), r#"{"q":[1]}"#);
        assert_eq!(second.text(), r#"{"q":[1]}"#);
        assert_eq!(second.status, 200);
        assert_eq!(f.upstream.calls_to("10.0.0.1:8001"), 1);
        assert_eq!(f.gateway.cache().stats().hits, 1);
        assert_eq!(f.events.events_of_kind("cache_hit").len(), 1);
    }

    #[tokio::test]
    async fn test_uncacheable_get_always_reaches_an_instance() {
        let f = fixture(&[(USER_SERVICE, 8002)]).await;

        let request = ServiceRequest::get(USER_SERVICE, "/users/42");
        f.gateway.route(&request).await.unwrap();
        f.gateway.route(&request).await.unwrap();

        assert_eq!(f.upstream.calls_to("10.0.0.1:8002"), 2);
    }

    #[tokio::test]
    async fn test_saga_runs_through_the_gateway() {
        let f = fixture(&[(USER_SERVICE, 8002), (GAME_SERVICE, 8001)]).await;
        f.upstream.script(
            "10.0.0.1:8002",
            vec![Scripted::Status(201, r#"{"user":{"_id":"u1"}}"#)],
        );
        f.upstream.script(
            "10.0.0.1:8001",
            vec![Scripted::Status(201, r#"{"game":{"_id":"g1"}}"#)],
        );

        let ids = f
            .gateway
            .create_user_with_game(json!({"name": "ada"}))
            .await
            .unwrap();
        assert_eq!(ids, ("u1".to_string(), "g1".to_string()));
        assert_eq!(f.events.events_of_kind("saga_completed").len(), 1);
    }
}
