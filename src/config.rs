//! Gateway configuration.
//!
//! Values are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. an optional YAML file named by `GATEWAY_CONFIG`
//! 3. environment variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | `5000` |
//! | `MAX_RETRIES` | `3` |
//! | `MAX_REDIRECTS` | `3` |
//! | `REGISTRY_URL` | `http://service_discovery:3000` |
//! | `REDIS_URL` | unset (process-local store) |
//! | `GATEWAY_HTTP_TIMEOUT_SECS` | `30` |
//! | `GATEWAY_RETRY_BACKOFF_MS` | `0` |
//! | `GATEWAY_RETRY_MAX_BACKOFF_MS` | `2000` |
//! | `GATEWAY_CACHE_RULES` | `/users/status=60,/game/questions=60` |
//! | `GATEWAY_CIRCUIT_RESET_SECS` | unset (circuits stay open) |
//! | `GATEWAY_CIRCUIT_KEY` | `host` |
//! | `GATEWAY_RATE_LIMIT` | unset (no limit) |
//! | `GATEWAY_SELF_NAME` / `GATEWAY_SELF_HOST` | `gateway` |
//!
//! An environment value that does not parse is ignored with a warning and the
//! previous layer's value stays in effect.

use crate::cache::{CacheRules, DEFAULT_RULES};
use crate::dispatch::RetryPolicy;
use crate::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitKeyMode};
use crate::resilience::rate_limiter::RateLimiterConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    /// Retries after the first attempt against one instance.
    pub max_retries: u32,
    /// Instances tried per dispatch.
    pub max_redirects: u32,
    pub registry_url: String,
    pub redis_url: Option<String>,
    pub http_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub cache_rules: CacheRules,
    pub circuit_reset_secs: Option<u64>,
    pub circuit_key: CircuitKeyMode,
    /// `N/SECS`, validated on load.
    pub rate_limit: Option<String>,
    pub self_name: String,
    pub self_host: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            max_retries: 3,
            max_redirects: 3,
            registry_url: "http://service_discovery:3000".to_string(),
            redis_url: None,
            http_timeout_secs: 30,
            retry_backoff_ms: 0,
            retry_max_backoff_ms: 2000,
            cache_rules: DEFAULT_RULES.parse().unwrap_or_default(),
            circuit_reset_secs: None,
            circuit_key: CircuitKeyMode::Host,
            rate_limit: None,
            self_name: "gateway".to_string(),
            self_host: "gateway".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}

fn parse_env_opt<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut Option<T>,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = Some(value),
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}

impl GatewayConfig {
    /// Defaults, then `GATEWAY_CONFIG`, then the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("GATEWAY_CONFIG") {
            Some(path) if !path.trim().is_empty() => Self::from_yaml_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(&lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid gateway config: {}", e),
                ErrorContext::new().with_source("config"),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw).map_err(|e| {
            Error::configuration_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_field_path("GATEWAY_CONFIG")
                    .with_details(path.display().to_string()),
            )
        })
    }

    fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        parse_env(lookup, "PORT", &mut self.port);
        parse_env(lookup, "MAX_RETRIES", &mut self.max_retries);
        parse_env(lookup, "MAX_REDIRECTS", &mut self.max_redirects);
        parse_env(lookup, "REGISTRY_URL", &mut self.registry_url);
        parse_env_opt(lookup, "REDIS_URL", &mut self.redis_url);
        parse_env(lookup, "GATEWAY_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs);
        parse_env(lookup, "GATEWAY_RETRY_BACKOFF_MS", &mut self.retry_backoff_ms);
        parse_env(lookup, "GATEWAY_RETRY_MAX_BACKOFF_MS", &mut self.retry_max_backoff_ms);
        parse_env(lookup, "GATEWAY_CACHE_RULES", &mut self.cache_rules);
        parse_env_opt(lookup, "GATEWAY_CIRCUIT_RESET_SECS", &mut self.circuit_reset_secs);
        parse_env(lookup, "GATEWAY_CIRCUIT_KEY", &mut self.circuit_key);
        parse_env_opt(lookup, "GATEWAY_RATE_LIMIT", &mut self.rate_limit);
        parse_env(lookup, "GATEWAY_SELF_NAME", &mut self.self_name);
        parse_env(lookup, "GATEWAY_SELF_HOST", &mut self.self_host);

        // Empty strings switch optional features off.
        if self.redis_url.as_deref().map(str::trim) == Some("") {
            self.redis_url = None;
        }
        if self.rate_limit.as_deref().map(str::trim) == Some("") {
            self.rate_limit = None;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_redirects == 0 {
            return Err(Error::configuration_with_context(
                "MAX_REDIRECTS must be at least 1",
                ErrorContext::new().with_field_path("MAX_REDIRECTS"),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::configuration_with_context(
                "timeout must be positive",
                ErrorContext::new().with_field_path("GATEWAY_HTTP_TIMEOUT_SECS"),
            ));
        }
        url::Url::parse(&self.registry_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid registry URL: {}", e),
                ErrorContext::new()
                    .with_field_path("REGISTRY_URL")
                    .with_details(self.registry_url.clone()),
            )
        })?;
        self.rate_limiter_config()?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_max_retries(self.max_retries).with_backoff(
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }

    pub fn circuit_config(&self) -> CircuitBreakerConfig {
        let config = CircuitBreakerConfig::new().with_key_mode(self.circuit_key);
        match self.circuit_reset_secs {
            Some(secs) if secs > 0 => config.with_reset_after(Duration::from_secs(secs)),
            _ => config,
        }
    }

    pub fn rate_limiter_config(&self) -> Result<Option<RateLimiterConfig>> {
        self.rate_limit
            .as_deref()
            .map(str::parse::<RateLimiterConfig>)
            .transpose()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    pub fn with_cache_rules(mut self, rules: CacheRules) -> Self {
        self.cache_rules = rules;
        self
    }

    pub fn with_circuit_key(mut self, mode: CircuitKeyMode) -> Self {
        self.circuit_key = mode;
        self
    }

    pub fn with_circuit_reset_secs(mut self, secs: u64) -> Self {
        self.circuit_reset_secs = Some(secs);
        self
    }

    pub fn with_rate_limit(mut self, limit: impl Into<String>) -> Self {
        self.rate_limit = Some(limit.into());
        self
    }

    pub fn with_retry_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.retry_backoff_ms = base_ms;
        self.retry_max_backoff_ms = max_ms;
        self
    }
}
