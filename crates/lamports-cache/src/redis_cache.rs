use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;

use crate::{Cache, CacheError};

/// A [`Cache`] shared between service instances, stored in Redis.
///
/// A single multiplexed connection is opened lazily on first use and shared by all callers.
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl RedisCache {
    /// Creates a cache for the given `redis://` url without connecting yet.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await
            .cloned()
            .map_err(backend_error)
    }
}

fn backend_error(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(error) => {
                tracing::warn!(%error, "Failed to connect to redis");
                return None;
            }
        };

        let value: redis::RedisResult<Option<String>> = conn.get(key).await;
        match value {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(error = &error as &dyn std::error::Error, key, "Redis GET failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // PSETEX rejects a zero expiry.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let result: redis::RedisResult<()> = conn.pset_ex(key, value, millis).await;
        result.map_err(backend_error)
    }
}
