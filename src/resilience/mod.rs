//! Resilience primitives.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Per-instance open/closed flags kept in the shared store |
//! | [`rate_limiter`] | Token bucket guarding the inbound surface |
//!
//! ## Circuit breaker
//!
//! Unlike an in-process breaker, the flag lives in the [`SharedStore`] so every
//! gateway replica sees an instance opened by any other replica:
//! - **Closed**: key absent, or any value other than `"0"`
//! - **Open**: key `circuit:<instance>` holds `"0"`
//!
//! There is no half-open state. An open flag stays until something clears it
//! ([`CircuitBreaker::close`]) or, when configured, until its store expiry.
//!
//! ```rust
//! use service_gateway::registry::ServiceInstance;
//! use service_gateway::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use service_gateway::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let breaker = CircuitBreaker::new(Arc::new(MemoryStore::default()), CircuitBreakerConfig::default());
//! let instance = ServiceInstance::new("game_engine_service", "10.0.0.7", 8080);
//!
//! assert!(!breaker.is_open(&instance).await);
//! breaker.open(&instance).await;
//! assert!(breaker.is_open(&instance).await);
//! # });
//! ```
//!
//! [`SharedStore`]: crate::store::SharedStore
//! [`CircuitBreaker::close`]: circuit_breaker::CircuitBreaker::close

pub mod circuit_breaker;
pub mod rate_limiter;
