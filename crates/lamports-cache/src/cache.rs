use std::time::Duration;

use async_trait::async_trait;

/// An error writing to a [`Cache`] backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The backend rejected the operation or could not be reached.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A key/value store with per-write expiration.
///
/// Implementations must be safe for concurrent use: workers for different keys call into the
/// same cache without any cross-key locking.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Looks up `key`.
    ///
    /// A backend that fails to answer reports a miss. Such failures are logged by the
    /// implementation and never surface to the caller.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

#[async_trait]
impl<C: Cache + ?Sized> Cache for std::sync::Arc<C> {
    async fn get(&self, key: &str) -> Option<String> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }
}
