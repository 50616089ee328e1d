//! Routing a service-level request to a concrete instance.
//!
//! Two layers:
//! - [`RetryEngine`] sends one request to one instance, retrying server-side
//!   failures and opening the instance's circuit when it gives up
//! - [`RedirectEngine`] resolves the service's instances, asks the selector
//!   for one and moves on to another instance when the retry engine gives up
//!
//! Anything that can route a [`ServiceRequest`] implements [`Dispatch`]; saga
//! steps are written against that trait.

mod redirect;
mod retry;

pub use redirect::RedirectEngine;
pub use retry::{RetryEngine, RetryPolicy};

use crate::registry::ServiceInstance;
use crate::transport::{UpstreamRequest, UpstreamResponse};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

/// A request addressed to a service by name rather than to an instance.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub service: String,
    pub method: Method,
    /// Path plus optional query string, e.g. `/game/questions?level=2`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl ServiceRequest {
    pub fn new(service: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(service, Method::GET, path)
    }

    pub fn delete(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(service, Method::DELETE, path)
    }

    pub fn post_json(
        service: impl Into<String>,
        path: impl Into<String>,
        body: &serde_json::Value,
    ) -> Result<Self> {
        Ok(Self::new(service, Method::POST, path)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_vec(body)?))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// The request as sent to `instance`.
    pub fn to_upstream(&self, instance: &ServiceInstance) -> UpstreamRequest {
        UpstreamRequest {
            method: self.method.clone(),
            url: format!("{}{}", instance.base_url(), self.path),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, request: &ServiceRequest) -> Result<UpstreamResponse>;
}
