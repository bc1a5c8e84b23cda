use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{Cache, CacheError};

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct InMemoryItem {
    /// When to evict this item from the in-memory cache.
    deadline: Instant,
    /// The actual data.
    value: String,
}

/// A struct implementing [`moka::Expiry`] that uses the [`InMemoryItem`] [`Instant`] as the
/// explicit expiration time.
struct CacheExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed, this will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl moka::Expiry<String, InMemoryItem> for CacheExpiration {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &InMemoryItem,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &InMemoryItem,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// A process-local [`Cache`] backed by moka, with an individual TTL per write.
#[derive(Clone)]
pub struct MemoryCache {
    items: moka::future::Cache<String, InMemoryItem>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("in-memory items", &self.items.entry_count())
            .finish()
    }
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        let items = moka::future::Cache::builder()
            .max_capacity(capacity)
            .name("balances")
            .expire_after(CacheExpiration)
            .build();
        Self { items }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let item = self.items.get(key).await?;
        // moka evicts lazily, so an entry can outlive its deadline for a moment.
        (item.deadline > Instant::now()).then_some(item.value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let item = InMemoryItem {
            deadline: Instant::now() + ttl,
            value: value.to_owned(),
        };
        self.items.insert(key.to_owned(), item).await;
        Ok(())
    }
}
