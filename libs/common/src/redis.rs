//! Redis client module with connection pooling
//!
//! Only the list operations needed by per-device command queues and
//! per-command result lists are exposed.

use anyhow::{Context, Result};
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use std::sync::Arc;
use std::time::Duration;

/// Redis connection pool configuration
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    /// Redis URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections
    pub min_idle: Option<u32>,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 64,
            min_idle: Some(4),
            connection_timeout: 5,
        }
    }
}

impl RedisPoolConfig {
    /// Create config from URL with default pool settings
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Redis asynchronous client with connection pooling
#[derive(Clone)]
pub struct RedisClient {
    pool: Arc<Pool<RedisConnectionManager>>,
    url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &self.url)
            .field("pool_state", &self.pool.state())
            .finish()
    }
}

impl RedisClient {
    /// Create a new client with default pool configuration
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_config(RedisPoolConfig::from_url(url)).await
    }

    /// Create a new client and verify the server answers PING
    pub async fn with_config(config: RedisPoolConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .context("Failed to create Redis connection manager")?;

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle)
            .connection_timeout(Duration::from_secs(config.connection_timeout))
            .build(manager)
            .await
            .context("Failed to build Redis connection pool")?;

        let client = Self {
            pool: Arc::new(pool),
            url: config.url,
        };
        client.ping().await?;
        Ok(client)
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .context("Failed to get connection from pool")
    }

    /// PING operation - test connection
    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .context("Failed to PING Redis server")
    }

    /// LPUSH operation - add element to list head
    pub async fn lpush(&self, key: &str, value: &str) -> Result<u32> {
        let mut conn = self.get_connection().await?;
        redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to LPUSH to key: {}", key))
    }

    /// RPUSH operation - add element to list tail
    pub async fn rpush(&self, key: &str, value: &str) -> Result<u32> {
        let mut conn = self.get_connection().await?;
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to RPUSH to key: {}", key))
    }

    /// RPOP operation - pop value from list tail
    pub async fn rpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("RPOP")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to RPOP key: {}", key))
    }

    /// LRANGE operation - read list elements in range
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to LRANGE key: {}", key))
    }

    /// Delete one key
    pub async fn del(&self, key: &str) -> Result<u32> {
        let mut conn = self.get_connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to DEL key: {}", key))
    }
}
