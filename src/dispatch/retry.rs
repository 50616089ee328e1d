//! Retry engine: bounded attempts against a single instance.

use super::ServiceRequest;
use crate::failure::FailureClass;
use crate::registry::ServiceInstance;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::telemetry::{emit, noop_sink, EventSink, GatewayEvent};
use crate::transport::{Upstream, UpstreamResponse};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Attempt budget and backoff for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. Never below 1.
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_max_retries(3)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// `max_retries` retries after the first attempt.
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self::new(max_retries.saturating_add(1))
    }

    pub fn with_backoff(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay.max(min_delay);
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.min_delay.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        // exponential backoff: min_delay * 2^attempt
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay)
    }
}

/// Outcome of one attempt, as far as retrying is concerned.
#[derive(Debug)]
enum Attempt {
    /// 1xx-4xx: handed back untouched.
    Done(UpstreamResponse),
    /// 5xx or no response at all.
    Failed { status: Option<u16>, message: String },
}

fn classify(outcome: std::result::Result<UpstreamResponse, crate::transport::TransportError>) -> Attempt {
    match outcome {
        Ok(response)
            if !FailureClass::from_http_status(response.status).is_some_and(|c| c.retryable()) =>
        {
            Attempt::Done(response)
        }
        Ok(response) => {
            let body = response.text();
            let message = if body.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                format!("HTTP {}: {}", response.status, truncate(&body, 200))
            };
            Attempt::Failed {
                status: Some(response.status),
                message,
            }
        }
        Err(e) => Attempt::Failed {
            status: None,
            message: e.to_string(),
        },
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub struct RetryEngine {
    upstream: Arc<dyn Upstream>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl RetryEngine {
    pub fn new(upstream: Arc<dyn Upstream>, breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            upstream,
            breaker,
            policy,
            events: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request` to `instance`.
    ///
    /// Client errors and successes return immediately. Server errors and
    /// transport failures are retried until the budget runs out, at which
    /// point the instance's circuit is opened and
    /// [`Error::InstanceExhausted`] is returned.
    pub async fn call(
        &self,
        instance: &ServiceInstance,
        request: &ServiceRequest,
    ) -> Result<UpstreamResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = self.upstream.send(request.to_upstream(instance)).await;
            let (status, message) = match classify(outcome) {
                Attempt::Done(response) => return Ok(response),
                Attempt::Failed { status, message } => (status, message),
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    service = %request.service,
                    instance = %instance.address(),
                    attempts = attempt,
                    error = %message,
                    "max retries reached, opening circuit"
                );
                self.breaker.open(instance).await;
                return Err(Error::InstanceExhausted {
                    service: request.service.clone(),
                    instance: instance.address(),
                    attempts: attempt,
                    status,
                    message,
                });
            }

            let delay = self.policy.backoff_delay(attempt - 1);
            emit(
                &self.events,
                GatewayEvent::RetryScheduled {
                    instance: instance.address(),
                    attempt,
                    max_attempts,
                    reason: message,
                },
            )
            .await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
