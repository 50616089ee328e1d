//! service-registry: minimal in-process service registry
//!
//! Usage:
//!   service-registry       Serve on 0.0.0.0:$REGISTRY_PORT (default 3000)

use anyhow::Context;
use service_gateway::registry::{server, InMemoryRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = match std::env::var("REGISTRY_PORT") {
        Ok(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid REGISTRY_PORT {:?}", raw))?,
        Err(_) => 3000,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = server::router(Arc::new(InMemoryRegistry::new())).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(addr = %listener.local_addr()?, "service registry listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
