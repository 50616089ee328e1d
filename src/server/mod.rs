//! Inbound HTTP surface.
//!
//! | Route | Behavior |
//! |-------|----------|
//! | `GET /status` | Liveness; never touches the routing core |
//! | `POST /users/create_with_game` | Runs the user-and-game saga; other methods are proxied |
//! | `/users/*`, `/game/*` (any method) | Proxied to the owning service |
//!
//! Every route but `/status` passes through the optional rate limiter.

use crate::dispatch::ServiceRequest;
use crate::gateway::{service_for_path, Gateway};
use crate::transport::UpstreamResponse;
use crate::{Error, Result};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Hop-by-hop or recomputed headers that are not forwarded to instances.
/// `accept-encoding` is dropped so instances answer with identity bodies,
/// which is what the cache and the saga steps read.
const STRIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
    "accept-encoding",
];

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route(
            "/users/create_with_game",
            post(create_with_game).fallback(proxy),
        )
        .fallback(proxy)
        .layer(middleware::from_fn_with_state(gateway.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(gateway: Arc<Gateway>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, router(gateway)).await?;
    Ok(())
}

async fn status() -> impl IntoResponse {
    Json(json!({ "status": "Gateway is up and running!" }))
}

async fn rate_limit(State(gateway): State<Arc<Gateway>>, request: Request, next: Next) -> Response {
    if request.uri().path() != "/status" {
        if let Some(limiter) = gateway.rate_limiter() {
            if !limiter.try_acquire().await {
                let retry_after = retry_after_secs(limiter.snapshot().await.estimated_wait_ms);
                tracing::warn!(path = %request.uri().path(), retry_after, "rate limit exceeded");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after.to_string())],
                    "Too many requests, please try again later.",
                )
                    .into_response();
            }
        }
    }
    next.run(request).await
}

/// Whole seconds until a token is expected back, at least 1.
fn retry_after_secs(wait_ms: Option<u64>) -> u64 {
    wait_ms.map(|ms| ms.div_ceil(1000)).unwrap_or(1).max(1)
}

async fn proxy(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let Some(service) = service_for_path(request.uri().path()) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" }))).into_response();
    };

    let Ok(method) = reqwest::Method::from_bytes(request.method().as_str().as_bytes()) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let mut headers = forwarded_headers(request.headers());
    let request_id = ensure_request_id(&mut headers);
    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let mut outbound = ServiceRequest::new(service, method, path_and_query);
    outbound.headers = headers;
    if !body.is_empty() {
        outbound = outbound.with_body(body);
    }

    match gateway.route(&outbound).await {
        Ok(response) => forward(response),
        Err(e) => {
            let class = e.failure_class();
            tracing::warn!(
                request_id = %request_id,
                service,
                code = class.code(),
                failure = class.name(),
                error = %e,
                "proxy request failed"
            );
            proxy_error(&e)
        }
    }
}

/// Returns the caller's request id, adding a fresh one when absent.
fn ensure_request_id(headers: &mut Vec<(String, String)>) -> String {
    if let Some((_, id)) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(REQUEST_ID_HEADER))
    {
        return id.clone();
    }
    let id = Uuid::new_v4().to_string();
    headers.push((REQUEST_ID_HEADER.to_string(), id.clone()));
    id
}

fn forwarded_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !STRIPPED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Backend status, body and the headers needed to decode the body.
fn forward(upstream: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = upstream.content_type() {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(encoding) = upstream.header("content-encoding") {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }
    builder
        .body(Body::from(upstream.body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn proxy_error(error: &Error) -> Response {
    let body = match error {
        Error::NoAvailableInstances { service } => json!({
            "message": format!(
                "{} is currently unavailable. Please try again later.",
                service.replace('_', " ")
            ),
        }),
        Error::RedirectsExhausted { last_error, .. } => json!({
            "message": "Unable to process the request",
            "last_error": last_error,
        }),
        other => json!({
            "message": "Unable to process the request",
            "last_error": other.to_string(),
        }),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

async fn create_with_game(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Response {
    let user = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|mut v| v.get_mut("user").map(Value::take))
        .filter(|user| !user.is_null());
    let Some(user) = user else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid request data" })),
        )
            .into_response();
    };

    match gateway.create_user_with_game(user).await {
        Ok((user_id, game_id)) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "User and game session created successfully",
                "user_id": user_id,
                "game_id": game_id,
            })),
        )
            .into_response(),
        Err(e) => {
            let reason = match &e {
                Error::Saga(saga) => saga.original().to_string(),
                other => other.to_string(),
            };
            tracing::error!(error = %e, "create_with_game failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to create user and game session",
                    "reason": reason,
                })),
            )
                .into_response()
        }
    }
}
