//! Instance selection.
//!
//! This module is pure bookkeeping over an instance list handed in by the
//! caller; it never talks to the registry itself. The only I/O it performs is
//! reading circuit flags through [`CircuitBreaker`].
//!
//! [`CircuitBreaker`]: crate::resilience::circuit_breaker::CircuitBreaker

mod selector;

pub use selector::InstanceSelector;
