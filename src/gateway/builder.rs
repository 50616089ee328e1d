use super::Gateway;
use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::dispatch::{RedirectEngine, RetryEngine};
use crate::registry::{HttpRegistryClient, ServiceRegistry};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::rate_limiter::RateLimiter;
use crate::routing::InstanceSelector;
use crate::store::{MemoryStore, SharedStore};
use crate::telemetry::{EventSink, TracingEventSink};
use crate::transport::{HttpTransport, Upstream};
use crate::Result;
use std::sync::Arc;

/// Builder for a [`Gateway`].
///
/// Every collaborator has a production default derived from the config;
/// tests swap in in-memory ones.
pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn SharedStore>>,
    registry: Option<Arc<dyn ServiceRegistry>>,
    upstream: Option<Arc<dyn Upstream>>,
    events: Arc<dyn EventSink>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            store: None,
            registry: None,
            upstream: None,
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared store for circuit flags and cached responses.
    /// Default: a process-local [`MemoryStore`].
    pub fn with_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Default: an [`HttpRegistryClient`] against `config.registry_url`.
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Default: an [`HttpTransport`] with `config.http_timeout_secs`.
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Inject an event sink. Default is [`TracingEventSink`].
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let config = self.config;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::default()),
        };
        let registry: Arc<dyn ServiceRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(HttpRegistryClient::new(
                config.registry_url.clone(),
                config.http_timeout(),
            )?),
        };
        let upstream: Arc<dyn Upstream> = match self.upstream {
            Some(upstream) => upstream,
            None => Arc::new(HttpTransport::new(config.http_timeout())?),
        };
        let events = self.events;

        let breaker = Arc::new(
            CircuitBreaker::new(store.clone(), config.circuit_config())
                .with_event_sink(events.clone()),
        );
        let selector = Arc::new(
            InstanceSelector::new(breaker.clone()).with_event_sink(events.clone()),
        );
        let cache = Arc::new(
            ResponseCache::new(store.clone(), config.cache_rules.clone())
                .with_event_sink(events.clone()),
        );
        let retry = RetryEngine::new(upstream, breaker.clone(), config.retry_policy())
            .with_event_sink(events.clone());
        let redirect = Arc::new(
            RedirectEngine::new(registry, selector.clone(), retry, config.max_redirects)
                .with_cache(cache.clone())
                .with_event_sink(events.clone()),
        );
        let rate_limiter = config
            .rate_limiter_config()?
            .map(|cfg| Arc::new(RateLimiter::new(cfg)));

        tracing::info!(
            store = store.name(),
            max_attempts = config.retry_policy().max_attempts,
            max_redirects = config.max_redirects,
            rate_limited = rate_limiter.is_some(),
            "gateway assembled"
        );

        Ok(Gateway {
            config,
            breaker,
            selector,
            redirect,
            cache,
            rate_limiter,
            events,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
