//! gateway: API gateway process
//!
//! Usage:
//!   gateway                Serve on 0.0.0.0:$PORT using environment configuration
//!
//! See `service_gateway::config` for every recognised variable.

use anyhow::Context;
use service_gateway::registry::HttpRegistryClient;
use service_gateway::{store, Gateway, GatewayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SELF_REGISTRATION_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env().context("loading gateway configuration")?;
    let shared_store = store::connect(config.redis_url.as_deref()).await;
    let registry = HttpRegistryClient::new(config.registry_url.clone(), config.http_timeout())
        .context("creating registry client")?;

    tokio::spawn(register_self(
        registry,
        config.self_name.clone(),
        config.self_host.clone(),
        config.port,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let gateway = Gateway::builder()
        .with_config(config)
        .with_store(shared_store)
        .build()
        .context("assembling gateway")?;

    service_gateway::server::serve(Arc::new(gateway), addr)
        .await
        .context("serving")?;
    Ok(())
}

/// Registers this gateway with the registry, retrying until it is accepted.
async fn register_self(registry: HttpRegistryClient, name: String, host: String, port: u16) {
    loop {
        match registry.register(&name, &host, port).await {
            Ok(()) => {
                tracing::info!(name = %name, host = %host, port, "registered with service registry");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_secs = SELF_REGISTRATION_INTERVAL.as_secs(),
                    "self-registration failed"
                );
                tokio::time::sleep(SELF_REGISTRATION_INTERVAL).await;
            }
        }
    }
}
