//! # service-gateway
//!
//! An API gateway for horizontally replicated backend services.
//!
//! ## Overview
//!
//! The gateway discovers live service instances from a registry, picks one
//! per request in round-robin order, retries server-side failures, fails over
//! to other instances and isolates instances that keep failing behind a
//! circuit flag kept in a store shared by every gateway replica. Idempotent
//! responses on an allow-list are cached in the same store. Operations that
//! span several services run as sagas with compensating actions.
//!
//! ## Key Features
//!
//! - **Instance selection**: [`routing::InstanceSelector`] rotates fairly over healthy instances
//! - **Retry / failover**: [`dispatch::RetryEngine`] and [`dispatch::RedirectEngine`]
//! - **Shared circuits**: [`resilience::circuit_breaker`] over any [`store::SharedStore`]
//! - **Caching**: allow-listed GET responses via [`cache::ResponseCache`]
//! - **Sagas**: ordered steps with LIFO compensation via [`saga::Saga`]
//! - **Telemetry**: routing decisions reported to an injected [`telemetry::EventSink`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use service_gateway::{Gateway, GatewayConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> service_gateway::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!     let addr = ([0, 0, 0, 0], config.port).into();
//!     let gateway = Gateway::builder().with_config(config).build()?;
//!     service_gateway::server::serve(Arc::new(gateway), addr).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Environment / YAML configuration |
//! | [`gateway`] | Gateway core and builder |
//! | [`server`] | Inbound axum routes |
//! | [`registry`] | Service instances, registry client, in-memory registry and its server |
//! | [`routing`] | Round-robin instance selection |
//! | [`dispatch`] | Retry and redirect engines |
//! | [`transport`] | Outbound HTTP to instances |
//! | [`resilience`] | Shared circuit flags and inbound rate limiting |
//! | [`store`] | Shared key-value store (memory or Redis) |
//! | [`cache`] | Response cache |
//! | [`saga`] | Saga coordinator and the user-and-game saga |
//! | [`telemetry`] | Structured gateway events |
//! | [`failure`] | Failure taxonomy |

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod failure;
pub mod gateway;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod saga;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use config::GatewayConfig;
pub use error::{Error, ErrorContext};
pub use failure::FailureClass;
pub use gateway::{Gateway, GatewayBuilder};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
