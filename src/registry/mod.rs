//! Service registry: instance records and the interfaces around them.
//!
//! The gateway core only ever calls [`ServiceRegistry::list_instances`]. The
//! rest of this module exists so the gateway can register itself and so a
//! registry server can be run locally.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ServiceInstance`] | One live replica of a named service |
//! | [`ServiceRegistry`] | Lookup trait consumed by the routing core |
//! | [`HttpRegistryClient`] | Talks to a remote registry over HTTP |
//! | [`InMemoryRegistry`] | Process-local registry, backing the registry server |
//! | [`server::router`] | axum routes of the registry server |

mod client;
mod memory;
pub mod server;

pub use client::HttpRegistryClient;
pub use memory::InMemoryRegistry;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity is `(name, host, port)`; `registered_at` is bookkeeping only.
///
/// Wire field names follow the registry's JSON: `ip` for the host and
/// `timestamp` (epoch millis) for the registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    #[serde(rename = "ip")]
    pub host: String,
    pub port: u16,
    #[serde(rename = "timestamp", default)]
    pub registered_at: u64,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            registered_at: now_millis(),
        }
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn same_identity(&self, other: &ServiceInstance) -> bool {
        self.name == other.name && self.host == other.host && self.port == other.port
    }
}

impl PartialEq for ServiceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}

impl Eq for ServiceInstance {}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Live instances of `name`, in registry order.
    async fn list_instances(&self, name: &str) -> Result<Vec<ServiceInstance>>;
}
