//! Redirect engine: fail over to other instances of the same service.

use super::{Dispatch, RetryEngine, ServiceRequest};
use crate::cache::ResponseCache;
use crate::registry::ServiceRegistry;
use crate::routing::InstanceSelector;
use crate::telemetry::{emit, noop_sink, EventSink, GatewayEvent};
use crate::transport::UpstreamResponse;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub struct RedirectEngine {
    registry: Arc<dyn ServiceRegistry>,
    selector: Arc<InstanceSelector>,
    retry: RetryEngine,
    cache: Option<Arc<ResponseCache>>,
    max_redirects: u32,
    events: Arc<dyn EventSink>,
}

impl RedirectEngine {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        selector: Arc<InstanceSelector>,
        retry: RetryEngine,
        max_redirects: u32,
    ) -> Self {
        Self {
            registry,
            selector,
            retry,
            cache: None,
            max_redirects: max_redirects.max(1),
            events: noop_sink(),
        }
    }

    /// Successful GETs are offered to `cache`; it decides what to keep.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    /// Routes `request` to some instance of `request.service`.
    ///
    /// Each pass re-reads the registry and re-runs selection, so an instance
    /// whose circuit the previous pass opened is skipped. An empty or fully
    /// open pool ends the dispatch at once with
    /// [`Error::NoAvailableInstances`]; that does not consume the redirect
    /// budget. After `max_redirects` failed instances the result is
    /// [`Error::RedirectsExhausted`].
    pub async fn dispatch(&self, request: &ServiceRequest) -> Result<UpstreamResponse> {
        let service = request.service.as_str();
        let mut failed: u32 = 0;
        let mut last_error = String::new();

        while failed < self.max_redirects {
            let instances = match self.registry.list_instances(service).await {
                Ok(instances) => instances,
                Err(e) => {
                    tracing::warn!(service, error = %e, "instance lookup failed, treating pool as empty");
                    Vec::new()
                }
            };

            let Some(instance) = self.selector.select(service, &instances).await else {
                return Err(Error::NoAvailableInstances {
                    service: service.to_string(),
                });
            };

            match self.retry.call(&instance, request).await {
                Ok(response) => {
                    if request.is_get() {
                        if let Some(cache) = &self.cache {
                            cache.store(&request.path, &response).await;
                        }
                    }
                    return Ok(response);
                }
                Err(e) if !e.failure_class().redirectable() => return Err(e),
                Err(e) => {
                    failed += 1;
                    last_error = e.to_string();
                    emit(
                        &self.events,
                        GatewayEvent::Redirected {
                            service: service.to_string(),
                            failed_instance: instance.address(),
                            redirects: failed,
                            reason: last_error.clone(),
                        },
                    )
                    .await;
                }
            }
        }

        Err(Error::RedirectsExhausted {
            service: service.to_string(),
            failed,
            last_error,
        })
    }
}

#[async_trait]
impl Dispatch for RedirectEngine {
    async fn dispatch(&self, request: &ServiceRequest) -> Result<UpstreamResponse> {
        RedirectEngine::dispatch(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{Scripted, ScriptedUpstream};
    use crate::dispatch::RetryPolicy;
    use crate::registry::InMemoryRegistry;
    use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitKeyMode};
    use crate::store::{MemoryStore, SharedStore};
    use crate::telemetry::InMemoryEventSink;

    const SERVICE: &str = "game_engine_service";

    struct Harness {
        engine: RedirectEngine,
        upstream: Arc<ScriptedUpstream>,
        registry: Arc<InMemoryRegistry>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<ResponseCache>,
        events: Arc<InMemoryEventSink>,
    }

    fn harness(instances: u16, max_attempts: u32, max_redirects: u32) -> Harness {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
        let events = Arc::new(InMemoryEventSink::default());
        let registry = Arc::new(InMemoryRegistry::new());
        for i in 0..instances {
            registry.register(SERVICE, "10.0.1.1", 8080 + i).unwrap();
        }
        let breaker = Arc::new(CircuitBreaker::new(
            store.clone(),
            CircuitBreakerConfig::new().with_key_mode(CircuitKeyMode::Address),
        ));
        let upstream = Arc::new(ScriptedUpstream::default());
        let selector = Arc::new(InstanceSelector::new(breaker.clone()));
        let retry = RetryEngine::new(upstream.clone(), breaker.clone(), RetryPolicy::new(max_attempts));
        let cache = Arc::new(ResponseCache::new(
            store,
            "/game/questions=60".parse().unwrap(),
        ));
        let engine = RedirectEngine::new(registry.clone(), selector, retry, max_redirects)
            .with_cache(cache.clone())
            .with_event_sink(events.clone());
        Harness {
            engine,
            upstream,
            registry,
            breaker,
            cache,
            events,
        }
    }

    fn failing(n: usize) -> Vec<Scripted> {
        (0..n).map(|_| Scripted::Status(500, "down")).collect()
    }

    #[tokio::test]
    async fn test_fails_over_to_next_instance() {
        let h = harness(3, 2, 3);
        h.upstream.script("10.0.1.1:8080", failing(2));

        let response = h
            .engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/42"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(h.upstream.calls_to("10.0.1.1:8080"), 2);
        assert_eq!(h.upstream.calls_to("10.0.1.1:8081"), 1);

        let instances = h.registry.all().unwrap();
        assert!(h.breaker.is_open(&instances[0]).await);
        assert_eq!(h.events.events_of_kind("redirected").len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_budget_exhausted() {
        let h = harness(4, 1, 2);
        for port in 8080..8084 {
            h.upstream.script(&format!("10.0.1.1:{}", port), failing(1));
        }

        let err = h
            .engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/42"))
            .await
            .unwrap_err();
        match err {
            Error::RedirectsExhausted { failed, ref last_error, .. } => {
                assert_eq!(failed, 2);
                assert!(last_error.contains("10.0.1.1:8081"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.upstream.calls().len(), 2);
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_all_open_fails_without_network() {
        let h = harness(2, 1, 3);
        for instance in h.registry.all().unwrap() {
            h.breaker.open(&instance).await;
        }

        let err = h
            .engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/42"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoAvailableInstances { .. }));
        assert_eq!(err.status_code(), 503);
        assert!(h.upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pool_exhaustion_mid_dispatch_is_terminal() {
        let h = harness(2, 1, 5);
        h.upstream.script("10.0.1.1:8080", failing(1));
        h.upstream.script("10.0.1.1:8081", failing(1));

        let err = h
            .engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/42"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoAvailableInstances { .. }));
        assert_eq!(h.upstream.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_service_is_unavailable() {
        let h = harness(0, 1, 3);
        let err = h
            .engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/42"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No available game_engine_service instances");
    }

    #[tokio::test]
    async fn test_client_error_is_not_redirected() {
        let h = harness(2, 3, 3);
        h.upstream
            .script("10.0.1.1:8080", vec![Scripted::Status(422, r#"{"error":"bad"}"#)]);

        let response = h
            .engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/42"))
            .await
            .unwrap();
        assert_eq!(response.status, 422);
        assert_eq!(h.upstream.calls().len(), 1);
        assert!(h.events.events_of_kind("redirected").is_empty());
    }

    #[tokio::test]
    async fn test_successful_allow_listed_get_is_cached() {
        let h = harness(1, 1, 1);
        h.upstream
            .script("10.0.1.1:8080", vec![Scripted::Status(200, r#"[{"q":1}]"#)]);

        h.engine
            .dispatch(&ServiceRequest::get(SERVICE, "/game/questions"))
            .await
            .unwrap();
        let cached = h.cache.lookup("/game/questions").await.unwrap();
        assert_eq!(cached.body, r#"[{"q":1}]"#);

        h.engine
            .dispatch(&ServiceRequest::delete(SERVICE, "/game/questions"))
            .await
            .unwrap();
        assert_eq!(h.cache.stats().stores, 1);
    }
}
