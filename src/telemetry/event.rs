//! Gateway event types.

use serde::{Deserialize, Serialize};

/// Structured decision points of the routing fabric and saga coordinator.
///
/// `instance` is always the `host:port` address of a concrete instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    InstanceSelected {
        service: String,
        instance: String,
    },
    CircuitSkipped {
        service: String,
        instance: String,
    },
    PoolExhausted {
        service: String,
        candidates: usize,
    },
    RetryScheduled {
        instance: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    CircuitOpened {
        instance: String,
        key: String,
    },
    Redirected {
        service: String,
        failed_instance: String,
        redirects: u32,
        reason: String,
    },
    CacheHit {
        key: String,
    },
    CacheMiss {
        key: String,
    },
    CacheStored {
        key: String,
        ttl_secs: u64,
    },
    CacheError {
        key: String,
        message: String,
    },
    SagaStepCompleted {
        saga: String,
        step: String,
    },
    SagaStepFailed {
        saga: String,
        step: String,
        error: String,
    },
    CompensationRan {
        saga: String,
        step: String,
    },
    CompensationFailed {
        saga: String,
        step: String,
        error: String,
    },
    SagaCompleted {
        saga: String,
    },
    SagaRolledBack {
        saga: String,
        failed_step: String,
    },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::InstanceSelected { .. } => "instance_selected",
            GatewayEvent::CircuitSkipped { .. } => "circuit_skipped",
            GatewayEvent::PoolExhausted { .. } => "pool_exhausted",
            GatewayEvent::RetryScheduled { .. } => "retry_scheduled",
            GatewayEvent::CircuitOpened { .. } => "circuit_opened",
            GatewayEvent::Redirected { .. } => "redirected",
            GatewayEvent::CacheHit { .. } => "cache_hit",
            GatewayEvent::CacheMiss { .. } => "cache_miss",
            GatewayEvent::CacheStored { .. } => "cache_stored",
            GatewayEvent::CacheError { .. } => "cache_error",
            GatewayEvent::SagaStepCompleted { .. } => "saga_step_completed",
            GatewayEvent::SagaStepFailed { .. } => "saga_step_failed",
            GatewayEvent::CompensationRan { .. } => "compensation_ran",
            GatewayEvent::CompensationFailed { .. } => "compensation_failed",
            GatewayEvent::SagaCompleted { .. } => "saga_completed",
            GatewayEvent::SagaRolledBack { .. } => "saga_rolled_back",
        }
    }

    /// Failure-side events; the tracing sink logs these at `warn`.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            GatewayEvent::PoolExhausted { .. }
                | GatewayEvent::CircuitOpened { .. }
                | GatewayEvent::Redirected { .. }
                | GatewayEvent::CacheError { .. }
                | GatewayEvent::SagaStepFailed { .. }
                | GatewayEvent::CompensationFailed { .. }
                | GatewayEvent::SagaRolledBack { .. }
        )
    }
}
