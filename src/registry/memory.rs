use super::{now_millis, ServiceInstance, ServiceRegistry};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::RwLock;

/// Process-local registry.
///
/// Records are kept in registration order; re-registering an existing
/// identity refreshes its timestamp in place. Nothing is ever evicted
/// automatically.
#[derive(Default)]
pub struct InMemoryRegistry {
    instances: RwLock<Vec<ServiceInstance>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, host: &str, port: u16) -> Result<ServiceInstance> {
        if name.trim().is_empty() || host.trim().is_empty() || port == 0 {
            return Err(Error::validation_with_context(
                "Invalid request data",
                ErrorContext::new()
                    .with_field_path("body")
                    .with_details("name, ip and port are required")
                    .with_source("registry"),
            ));
        }

        let mut instances = self.instances.write().map_err(|_| Self::poisoned())?;
        let candidate = ServiceInstance::new(name, host, port);
        match instances.iter_mut().find(|i| i.same_identity(&candidate)) {
            Some(existing) => {
                existing.registered_at = now_millis();
                Ok(existing.clone())
            }
            None => {
                instances.push(candidate.clone());
                tracing::info!(service = name, host, port, "registered service");
                Ok(candidate)
            }
        }
    }

    pub fn unregister(&self, name: &str, host: &str, port: u16) -> Result<bool> {
        let mut instances = self.instances.write().map_err(|_| Self::poisoned())?;
        let before = instances.len();
        instances.retain(|i| !(i.name == name && i.host == host && i.port == port));
        let removed = instances.len() != before;
        if removed {
            tracing::info!(service = name, host, port, "unregistered service");
        }
        Ok(removed)
    }

    pub fn all(&self) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .instances
            .read()
            .map_err(|_| Self::poisoned())?
            .clone())
    }

    fn poisoned() -> Error {
        Error::runtime_with_context(
            "registry lock poisoned",
            ErrorContext::new().with_source("registry"),
        )
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn list_instances(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|i| i.name == name)
            .collect())
    }
}
