use crate::registry::ServiceInstance;
use crate::store::SharedStore;
use crate::telemetry::{emit, noop_sink, EventSink, GatewayEvent};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "circuit:";
const OPEN: &str = "0";

/// Granularity of circuit keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitKeyMode {
    /// `circuit:<host>`: every instance on a host shares one flag.
    #[default]
    Host,
    /// `circuit:<host>:<port>`
    Address,
}

impl FromStr for CircuitKeyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "address" | "host_port" => Ok(Self::Address),
            other => Err(Error::configuration_with_context(
                format!("unknown circuit key mode '{}'", other),
                ErrorContext::new()
                    .with_field_path("GATEWAY_CIRCUIT_KEY")
                    .with_details("expected 'host' or 'address'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerConfig {
    pub key_mode: CircuitKeyMode,
    /// Store expiry for open flags. `None` keeps them open until cleared.
    pub reset_after: Option<Duration>,
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_mode(mut self, mode: CircuitKeyMode) -> Self {
        self.key_mode = mode;
        self
    }

    pub fn with_reset_after(mut self, reset_after: Duration) -> Self {
        self.reset_after = Some(reset_after);
        self
    }
}

/// Shared-store circuit flags.
///
/// - Store read failures count as closed
/// - Store write failures are logged and swallowed
/// - Concurrent opens race benignly; the flag value is the same
pub struct CircuitBreaker {
    store: Arc<dyn SharedStore>,
    cfg: CircuitBreakerConfig,
    events: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn SharedStore>, cfg: CircuitBreakerConfig) -> Self {
        Self {
            store,
            cfg,
            events: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn key(&self, instance: &ServiceInstance) -> String {
        match self.cfg.key_mode {
            CircuitKeyMode::Host => format!("{}{}", KEY_PREFIX, instance.host),
            CircuitKeyMode::Address => format!("{}{}", KEY_PREFIX, instance.address()),
        }
    }

    pub async fn is_open(&self, instance: &ServiceInstance) -> bool {
        let key = self.key(instance);
        match self.store.get(&key).await {
            Ok(value) => value.as_deref() == Some(OPEN),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "circuit state unreadable, treating as closed");
                false
            }
        }
    }

    /// Marks the instance unusable for every replica sharing the store.
    pub async fn open(&self, instance: &ServiceInstance) {
        let key = self.key(instance);
        if let Err(e) = self.store.set(&key, OPEN, self.cfg.reset_after).await {
            tracing::warn!(key = %key, error = %e, "failed to persist open circuit");
            return;
        }
        emit(
            &self.events,
            GatewayEvent::CircuitOpened {
                instance: instance.address(),
                key,
            },
        )
        .await;
    }

    /// Clears the flag. Returns whether a flag was present.
    pub async fn close(&self, instance: &ServiceInstance) -> Result<bool> {
        let key = self.key(instance);
        let removed = self.store.delete(&key).await?;
        if removed {
            tracing::info!(key = %key, "circuit closed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::telemetry::InMemoryEventSink;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl SharedStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(Error::store_with_context("down", ErrorContext::new()))
        }
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<()> {
            Err(Error::store_with_context("down", ErrorContext::new()))
        }
        async fn delete(&self, _: &str) -> Result<bool> {
            Err(Error::store_with_context("down", ErrorContext::new()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn instance(host: &str, port: u16) -> ServiceInstance {
        ServiceInstance::new("user_management_service", host, port)
    }

    #[test]
    fn test_key_modes() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
        let by_host = CircuitBreaker::new(store.clone(), CircuitBreakerConfig::default());
        assert_eq!(by_host.key(&instance("10.0.0.1", 3001)), "circuit:10.0.0.1");

        let by_address = CircuitBreaker::new(
            store,
            CircuitBreakerConfig::new().with_key_mode(CircuitKeyMode::Address),
        );
        assert_eq!(
            by_address.key(&instance("10.0.0.1", 3001)),
            "circuit:10.0.0.1:3001"
        );
    }

    #[test]
    fn test_key_mode_parsing() {
        assert_eq!("host".parse::<CircuitKeyMode>().unwrap(), CircuitKeyMode::Host);
        assert_eq!(
            "Address".parse::<CircuitKeyMode>().unwrap(),
            CircuitKeyMode::Address
        );
        assert!("rack".parse::<CircuitKeyMode>().is_err());
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let events = Arc::new(InMemoryEventSink::default());
        let breaker = CircuitBreaker::new(
            Arc::new(MemoryStore::default()),
            CircuitBreakerConfig::default(),
        )
        .with_event_sink(events.clone());
        let a = instance("10.0.0.1", 3001);

        assert!(!breaker.is_open(&a).await);
        breaker.open(&a).await;
        assert!(breaker.is_open(&a).await);
        assert_eq!(events.events_of_kind("circuit_opened").len(), 1);

        assert!(breaker.close(&a).await.unwrap());
        assert!(!breaker.is_open(&a).await);
        assert!(!breaker.close(&a).await.unwrap());
    }

    #[tokio::test]
    async fn test_host_mode_shares_flag_across_ports() {
        let breaker = CircuitBreaker::new(
            Arc::new(MemoryStore::default()),
            CircuitBreakerConfig::default(),
        );
        breaker.open(&instance("10.0.0.1", 3001)).await;
        assert!(breaker.is_open(&instance("10.0.0.1", 3002)).await);
        assert!(!breaker.is_open(&instance("10.0.0.2", 3001)).await);
    }

    #[tokio::test]
    async fn test_any_other_value_is_closed() {
        let store = Arc::new(MemoryStore::default());
        store.set("circuit:10.0.0.1", "1", None).await.unwrap();
        let breaker = CircuitBreaker::new(store, CircuitBreakerConfig::default());
        assert!(!breaker.is_open(&instance("10.0.0.1", 3001)).await);
    }

    #[tokio::test]
    async fn test_reset_after_expires_flag() {
        let breaker = CircuitBreaker::new(
            Arc::new(MemoryStore::default()),
            CircuitBreakerConfig::new().with_reset_after(Duration::from_millis(20)),
        );
        let a = instance("10.0.0.1", 3001);
        breaker.open(&a).await;
        assert!(breaker.is_open(&a).await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!breaker.is_open(&a).await);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_to_closed() {
        let events = Arc::new(InMemoryEventSink::default());
        let breaker = CircuitBreaker::new(Arc::new(BrokenStore), CircuitBreakerConfig::default())
            .with_event_sink(events.clone());
        let a = instance("10.0.0.1", 3001);

        breaker.open(&a).await;
        assert!(!breaker.is_open(&a).await);
        assert!(events.is_empty());
        assert!(breaker.close(&a).await.is_err());
    }
}
