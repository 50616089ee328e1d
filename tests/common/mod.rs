//! Shared harness: a gateway served on an ephemeral port, backed by the
//! in-memory registry and store, with mockito servers as instances.

#![allow(dead_code)]

use service_gateway::registry::InMemoryRegistry;
use service_gateway::resilience::circuit_breaker::CircuitKeyMode;
use service_gateway::store::MemoryStore;
use service_gateway::telemetry::InMemoryEventSink;
use service_gateway::{Gateway, GatewayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const USER_SERVICE: &str = "user_management_service";
pub const GAME_SERVICE: &str = "game_engine_service";

pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub registry: Arc<InMemoryRegistry>,
    pub events: Arc<InMemoryEventSink>,
    pub http: reqwest::Client,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Registers a mockito server as an instance of `service`.
    pub fn register(&self, service: &str, server: &mockito::ServerGuard) {
        let addr = server.host_with_port();
        let (host, port) = addr.rsplit_once(':').expect("host:port");
        self.registry
            .register(service, host, port.parse().expect("port"))
            .expect("register instance");
    }
}

/// Test defaults: circuits keyed by `host:port` so several mock servers on
/// 127.0.0.1 stay independent, and no retry backoff.
pub fn test_config() -> GatewayConfig {
    GatewayConfig::default()
        .with_registry_url("http://127.0.0.1:9")
        .with_circuit_key(CircuitKeyMode::Address)
        .with_retry_backoff(0, 0)
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let registry = Arc::new(InMemoryRegistry::new());
    let events = Arc::new(InMemoryEventSink::default());
    let gateway = Arc::new(
        Gateway::builder()
            .with_config(config)
            .with_store(Arc::new(MemoryStore::default()))
            .with_registry(registry.clone())
            .with_event_sink(events.clone())
            .build()
            .expect("build gateway"),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = service_gateway::server::router(gateway.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestGateway {
        addr,
        gateway,
        registry,
        events,
        http: reqwest::Client::new(),
    }
}
