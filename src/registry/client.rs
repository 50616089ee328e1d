use super::{ServiceInstance, ServiceRegistry};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Client for a remote registry server.
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid registry URL: {}", e),
                ErrorContext::new()
                    .with_field_path("REGISTRY_URL")
                    .with_details(base_url.clone()),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(crate::transport::TransportError::Http(e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every registered instance, across all services.
    pub async fn all_instances(&self) -> Result<Vec<ServiceInstance>> {
        let response = self
            .client
            .get(format!("{}/services", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Vec<ServiceInstance>>()
            .await
            .map_err(|e| Error::Transport(e.into()))
    }

    pub async fn register(&self, name: &str, host: &str, port: u16) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(&json!({ "name": name, "ip": host, "port": port }))
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::UpstreamRejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl ServiceRegistry for HttpRegistryClient {
    /// Registry failures are logged and surface as an empty pool.
    async fn list_instances(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        match self.all_instances().await {
            Ok(all) => Ok(all.into_iter().filter(|i| i.name == name).collect()),
            Err(e) => {
                tracing::warn!(service = name, error = %e, "registry lookup failed");
                Ok(Vec::new())
            }
        }
    }
}
