use futures::future;

use crate::{CoalescingQueue, Resolution, TimedOut};

/// The entry point for callers that want a value for a key.
#[derive(Debug, Clone)]
pub struct Resolver {
    queue: CoalescingQueue,
}

impl Resolver {
    /// Creates a resolver on top of `queue`.
    pub fn new(queue: CoalescingQueue) -> Self {
        Self { queue }
    }

    /// The underlying queue.
    pub fn queue(&self) -> &CoalescingQueue {
        &self.queue
    }

    /// Resolves `key`, waiting behind any lookup for it that is already in flight.
    pub async fn request(&self, key: &str) -> Result<Resolution, TimedOut> {
        self.queue.enqueue(key).await
    }

    /// Resolves all `keys` concurrently.
    ///
    /// The outcomes are returned in the order of `keys`. Repeated keys coalesce like any other
    /// concurrent requests for the same key.
    pub async fn request_all<I, K>(&self, keys: I) -> Vec<Result<Resolution, TimedOut>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        // Everything is queued before anything is awaited, so the whole batch coalesces.
        let handles: Vec<_> = keys
            .into_iter()
            .map(|key| self.queue.enqueue(key.as_ref()))
            .collect();
        future::join_all(handles).await
    }
}
