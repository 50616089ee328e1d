//! Redis store backend.

use super::SharedStore;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Store shared by every gateway replica pointed at the same Redis.
///
/// The connection manager reconnects transparently; individual command
/// failures surface as [`Error::Store`] and callers degrade (cache miss,
/// circuit treated as closed).
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid Redis URL: {}", e),
                ErrorContext::new()
                    .with_field_path("REDIS_URL")
                    .with_source("redis_store"),
            )
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Self::command_error("connect", e))?;
        Ok(Self { conn })
    }

    fn command_error(op: &str, e: redis::RedisError) -> Error {
        Error::store_with_context(
            format!("Redis {} failed: {}", op, e),
            ErrorContext::new().with_source("redis_store"),
        )
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| Self::command_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| Self::command_error("SET EX", e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| Self::command_error("SET", e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|e| Self::command_error("DEL", e))?;
        Ok(removed > 0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
