use crate::registry::ServiceInstance;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::telemetry::{emit, noop_sink, EventSink, GatewayEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Round-robin selection that skips instances with an open circuit.
///
/// Cursors are per service name and local to this selector; replicas do not
/// coordinate, so fairness holds per gateway process only. Concurrent
/// selections for the same service may interleave their cursor updates,
/// which skews the rotation but never starves an instance.
pub struct InstanceSelector {
    breaker: Arc<CircuitBreaker>,
    cursors: Mutex<HashMap<String, usize>>,
    events: Arc<dyn EventSink>,
}

impl InstanceSelector {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            cursors: Mutex::new(HashMap::new()),
            events: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Current cursor for `service` (0 if never selected).
    pub fn cursor(&self, service: &str) -> usize {
        self.cursors
            .lock()
            .map(|c| c.get(service).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn store_cursor(&self, service: &str, value: usize) {
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.insert(service.to_string(), value);
        }
    }

    /// Picks the next instance with a closed circuit, or `None` when every
    /// candidate is open (or there are none).
    ///
    /// Scans at most `instances.len()` candidates starting at the cursor. The
    /// cursor moves past the chosen instance; when nothing is available it
    /// still advances by one so the next scan starts elsewhere.
    pub async fn select(
        &self,
        service: &str,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        let len = instances.len();
        if len == 0 {
            emit(
                &self.events,
                GatewayEvent::PoolExhausted {
                    service: service.to_string(),
                    candidates: 0,
                },
            )
            .await;
            return None;
        }

        // The list may have shrunk since the cursor was stored.
        let start = self.cursor(service) % len;

        for offset in 0..len {
            let index = (start + offset) % len;
            let candidate = &instances[index];
            if self.breaker.is_open(candidate).await {
                emit(
                    &self.events,
                    GatewayEvent::CircuitSkipped {
                        service: service.to_string(),
                        instance: candidate.address(),
                    },
                )
                .await;
                continue;
            }

            self.store_cursor(service, (index + 1) % len);
            emit(
                &self.events,
                GatewayEvent::InstanceSelected {
                    service: service.to_string(),
                    instance: candidate.address(),
                },
            )
            .await;
            return Some(candidate.clone());
        }

        self.store_cursor(service, (start + 1) % len);
        emit(
            &self.events,
            GatewayEvent::PoolExhausted {
                service: service.to_string(),
                candidates: len,
            },
        )
        .await;
        None
    }
}
