//! Injected observability interface.
//!
//! Components never log routing or saga decisions through ambient globals.
//! Each one holds an `Arc<dyn EventSink>` handed to it at construction and
//! reports [`GatewayEvent`]s to it; what happens to an event is the sink's
//! business.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`GatewayEvent`] | Typed event enum |
//! | [`EventSink`] | Trait for event destinations |
//! | [`TracingEventSink`] | Default sink: one `tracing` record per event |
//! | [`NoopEventSink`] | Discards everything |
//! | [`InMemoryEventSink`] | Bounded in-memory sink for tests |
//! | [`CompositeEventSink`] | Fans out to several sinks |

mod event;

pub use event::GatewayEvent;

use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn report(&self, event: GatewayEvent) -> Result<()>;
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Reports an event, ignoring sink failures.
pub(crate) async fn emit(sink: &Arc<dyn EventSink>, event: GatewayEvent) {
    if let Err(e) = sink.report(event).await {
        tracing::debug!(error = %e, "event sink rejected event");
    }
}

pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn report(&self, _: GatewayEvent) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoopEventSink)
}

/// Default sink. Failure-side events go out at `warn`, the rest at `debug`.
#[derive(Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn report(&self, event: GatewayEvent) -> Result<()> {
        let kind = event.kind();
        let fields = serde_json::to_string(&event)?;
        if event.is_warning() {
            tracing::warn!(event = kind, fields = %fields, "gateway event");
        } else {
            tracing::debug!(event = kind, fields = %fields, "gateway event");
        }
        Ok(())
    }
}

/// In-memory sink for testing.
pub struct InMemoryEventSink {
    events: RwLock<VecDeque<GatewayEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events
            .read()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn events_of_kind(&self, kind: &str) -> Vec<GatewayEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn report(&self, event: GatewayEvent) -> Result<()> {
        let mut events = self.events.write().map_err(|_| {
            crate::Error::runtime_with_context(
                "event buffer lock poisoned",
                crate::ErrorContext::new().with_source("in_memory_event_sink"),
            )
        })?;
        events.push_back(event);
        if events.len() > self.max_events {
            events.pop_front();
        }
        Ok(())
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn report(&self, event: GatewayEvent) -> Result<()> {
        for s in &self.sinks {
            let _ = s.report(event.clone()).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for s in &self.sinks {
            let _ = s.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(key: &str) -> GatewayEvent {
        GatewayEvent::CacheHit { key: key.into() }
    }

    #[tokio::test]
    async fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        sink.report(hit("a")).await.unwrap();
        sink.report(hit("b")).await.unwrap();
        sink.report(hit("c")).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events(), vec![hit("b"), hit("c")]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_composite_fans_out() {
        let a = Arc::new(InMemoryEventSink::default());
        let b = Arc::new(InMemoryEventSink::default());
        let composite = CompositeEventSink::new()
            .add_sink(a.clone())
            .add_sink(b.clone())
            .add_sink(noop_sink());

        composite.report(hit("/game/questions")).await.unwrap();
        composite.close().await.unwrap();

        assert_eq!(a.events_of_kind("cache_hit").len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_every_event() {
        let sink = TracingEventSink;
        sink.report(hit("/users/status")).await.unwrap();
        sink.report(GatewayEvent::PoolExhausted {
            service: "game_engine_service".into(),
            candidates: 2,
        })
        .await
        .unwrap();
    }
}
