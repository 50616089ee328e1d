//! Cache allow-list.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RULES: &str = "/users/status=60,/game/questions=60";
const DEFAULT_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRule {
    pub path: String,
    pub ttl_secs: u64,
}

impl CacheRule {
    pub fn new(path: impl Into<String>, ttl: Duration) -> Self { Self { path: path.into(), ttl_secs: ttl.as_secs() } }
    pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheRules {
    rules: Vec<CacheRule>,
}

impl CacheRules {
    pub fn new(rules: Vec<CacheRule>) -> Self { Self { rules } }
    pub fn none() -> Self { Self::default() }
    pub fn is_empty(&self) -> bool { self.rules.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &CacheRule> { self.rules.iter() }

    /// TTL for a cache key (`path[?query]`), matched on the path alone.
    pub fn ttl_for(&self, key: &str) -> Option<Duration> {
        let path = key.split('?').next().unwrap_or(key);
        self.rules.iter().find(|r| r.path == path).map(CacheRule::ttl)
    }
}

/// Parses `path=ttl_secs[,path=ttl_secs...]`. A bare path gets a 60s TTL.
impl FromStr for CacheRules {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (path, ttl_secs) = match part.split_once('=') {
                Some((path, ttl)) => {
                    let ttl = ttl.trim().parse::<u64>().map_err(|_| {
                        Error::configuration_with_context(
                            format!("invalid cache TTL in '{}'", part),
                            ErrorContext::new()
                                .with_field_path("GATEWAY_CACHE_RULES")
                                .with_details("expected 'path=seconds'"),
                        )
                    })?;
                    (path.trim(), ttl)
                }
                None => (part, DEFAULT_TTL_SECS),
            };
            if !path.starts_with('/') || ttl_secs == 0 {
                return Err(Error::configuration_with_context(
                    format!("invalid cache rule '{}'", part),
                    ErrorContext::new()
                        .with_field_path("GATEWAY_CACHE_RULES")
                        .with_details("paths start with '/' and TTLs are positive"),
                ));
            }
            rules.push(CacheRule { path: path.to_string(), ttl_secs });
        }
        Ok(Self { rules })
    }
}
