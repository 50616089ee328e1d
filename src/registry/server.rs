//! HTTP surface of the registry server.
//!
//! - `POST /register {name, ip, port}` registers or refreshes an instance
//! - `GET /services` lists every instance
//! - `GET /health`, `GET /status` report liveness

use super::InMemoryRegistry;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router(registry: Arc<InMemoryRegistry>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/services", get(services))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(registry)
}

/// Extracts `(name, ip, port)`. Ports may arrive as numbers or numeric strings.
fn parse_registration(body: &[u8]) -> Option<(String, String, u16)> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    let ip = value.get("ip")?.as_str()?.to_string();
    let port = match value.get("port")? {
        Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse::<u16>().ok()?,
        _ => return None,
    };
    Some((name, ip, port))
}

async fn register(State(registry): State<Arc<InMemoryRegistry>>, body: Bytes) -> Response {
    let invalid = (StatusCode::BAD_REQUEST, "Invalid request data");
    let Some((name, ip, port)) = parse_registration(&body) else {
        tracing::warn!("invalid registration payload");
        return invalid.into_response();
    };
    match registry.register(&name, &ip, port) {
        Ok(_) => (StatusCode::OK, "Service registered successfully").into_response(),
        Err(e) if e.status_code() == 400 => invalid.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "registration failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn services(State(registry): State<Arc<InMemoryRegistry>>) -> Response {
    match registry.all() {
        Ok(all) => Json(all).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}

async fn status() -> impl IntoResponse {
    Json(json!({ "status": "Service discovery is up and running" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registration() {
        assert_eq!(
            parse_registration(br#"{"name":"svc","ip":"10.0.0.1","port":3001}"#),
            Some(("svc".into(), "10.0.0.1".into(), 3001))
        );
        assert_eq!(
            parse_registration(br#"{"name":"svc","ip":"10.0.0.1","port":"3001"}"#),
            Some(("svc".into(), "10.0.0.1".into(), 3001))
        );
        assert_eq!(parse_registration(br#"{"name":"svc","ip":"10.0.0.1"}"#), None);
        assert_eq!(
            parse_registration(br#"{"name":"svc","ip":"h","port":70000}"#),
            None
        );
        assert_eq!(parse_registration(b"not json"), None);
    }

    #[tokio::test]
    async fn test_health() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
