use async_trait::async_trait;

/// An error performing an upstream lookup.
///
/// This is `Clone` because a single failed lookup is reported to every request that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The key cannot be looked up at all.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The upstream source failed or could not be reached.
    #[error("upstream request failed: {0}")]
    Upstream(String),
    /// The upstream source answered with something we could not understand.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// Performs the actual, expensive lookup for a key.
///
/// The queue treats this as a black box with unbounded latency. It is never retried.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the current value for `key`.
    async fn fetch(&self, key: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, key: &str) -> Result<String, FetchError> {
        (**self).fetch(key).await
    }
}
