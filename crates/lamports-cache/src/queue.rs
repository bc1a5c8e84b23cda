use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::Instrument;

use crate::registry::Registry;
use crate::waiter::{Resolution, Waiter, WaiterHandle, WaiterId};
use crate::{Cache, FetchError, Fetcher};

/// Tuning for a [`CoalescingQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// How long a request may stay queued before it is cancelled.
    pub timeout: Duration,
    /// How long a fetched value stays in the cache.
    pub value_ttl: Duration,
    /// Prepended to every key to form its cache key.
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            value_ttl: Duration::from_secs(10),
            key_prefix: "wallet:".into(),
        }
    }
}

/// A per-key request-coalescing queue with cache-aside lookups.
///
/// Each call to [`enqueue`](Self::enqueue) queues a request behind its key. While a key has
/// queued requests, exactly one background worker serves them in arrival order: it answers the
/// oldest request from the [`Cache`] if possible and otherwise asks the [`Fetcher`], writing the
/// fetched value back into the cache so that the requests queued behind it are answered from
/// there. When the fetcher fails, every request queued at that moment receives the same error.
/// The worker exits as soon as the queue for its key is empty.
///
/// Every request carries its own deadline. A request still queued when it passes is removed and
/// its handle resolves to [`TimedOut`](crate::TimedOut), without affecting other requests.
///
/// The queue spawns tokio tasks and must be used from within a tokio runtime.
#[derive(Clone)]
pub struct CoalescingQueue {
    config: Arc<QueueConfig>,
    cache: Arc<dyn Cache>,
    fetcher: Arc<dyn Fetcher>,
    registry: Registry,
}

impl std::fmt::Debug for CoalescingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingQueue")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

impl CoalescingQueue {
    /// Creates a queue with a fresh [`Registry`].
    pub fn new(cache: Arc<dyn Cache>, fetcher: Arc<dyn Fetcher>, config: QueueConfig) -> Self {
        Self::with_registry(cache, fetcher, config, Registry::new())
    }

    /// Creates a queue operating on the given `registry`.
    pub fn with_registry(
        cache: Arc<dyn Cache>,
        fetcher: Arc<dyn Fetcher>,
        config: QueueConfig,
        registry: Registry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            fetcher,
            registry,
        }
    }

    /// The registry holding the queued requests.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Queues a request for `key` and returns immediately.
    ///
    /// Starts a worker for `key` if none is running.
    pub fn enqueue(&self, key: &str) -> WaiterHandle {
        let (sender, receiver) = oneshot::channel();
        let deadline = tokio::time::Instant::now() + self.config.timeout;

        let mut state = self.registry.lock();
        let (id, epoch) = state.push(key, Waiter::new(sender));
        let timer = tokio::spawn(expire(self.registry.clone(), key.to_owned(), id, deadline));
        state.set_timer(key, id, timer.abort_handle());
        drop(state);

        if let Some(epoch) = epoch {
            tracing::debug!(key, epoch, "Starting worker");
            let worker = Worker {
                key: key.to_owned(),
                cache_key: format!("{}{key}", self.config.key_prefix),
                epoch,
                queue: self.clone(),
            };
            let span = tracing::debug_span!("coalescing_worker", key, epoch);
            tokio::spawn(worker.run().instrument(span));
        }

        WaiterHandle::new(id, receiver)
    }
}

/// Cancels the request `id` once its deadline has passed, unless it was served before.
async fn expire(registry: Registry, key: String, id: WaiterId, deadline: tokio::time::Instant) {
    tokio::time::sleep_until(deadline).await;

    let waiter = registry.lock().remove(&key, id);
    if let Some(waiter) = waiter {
        tracing::debug!(key = %key, waiter = %id, "Request timed out while queued");
        waiter.cancel();
    }
}

/// Serves the requests queued for one key until none are left.
struct Worker {
    key: String,
    cache_key: String,
    /// Identifies the queue entry this worker owns.
    epoch: u64,
    queue: CoalescingQueue,
}

impl Worker {
    async fn run(self) {
        let CoalescingQueue {
            config,
            cache,
            fetcher,
            registry,
        } = &self.queue;

        loop {
            // An absent entry means every request was served or timed out. An entry with a
            // different epoch was re-created after that, and belongs to a newer worker.
            let head = registry.lock().head(&self.key, self.epoch);
            let Some(head) = head else {
                break;
            };

            if let Some(value) = cache.get(&self.cache_key).await {
                tracing::trace!(waiter = %head, "Cache hit");
                self.deliver(Resolution::hit(value));
                continue;
            }

            tracing::trace!(waiter = %head, "Cache miss, fetching");
            match fetcher.fetch(&self.key).await {
                Ok(value) => {
                    if let Err(error) = cache
                        .set(&self.cache_key, &value, config.value_ttl)
                        .await
                    {
                        tracing::warn!(
                            error = &error as &dyn std::error::Error,
                            "Failed to write fetched value to cache"
                        );
                    }
                    self.deliver(Resolution::fetched(value));
                }
                Err(error) => self.broadcast(error),
            }
        }

        tracing::debug!("Worker finished");
    }

    /// Hands `resolution` to the oldest queued request.
    fn deliver(&self, resolution: Resolution) {
        let head = self.queue.registry.lock().pop_head(&self.key, self.epoch);
        if let Some((id, waiter)) = head {
            waiter.deliver(id, resolution);
        }
    }

    /// Fails every queued request with the same `error`.
    fn broadcast(&self, error: FetchError) {
        let waiters = self.queue.registry.lock().drain(&self.key, self.epoch);
        tracing::debug!(
            error = &error as &dyn std::error::Error,
            waiters = waiters.len(),
            "Fetch failed, failing all queued requests"
        );
        for (id, waiter) in waiters {
            waiter.deliver(id, Resolution::failed(error.clone()));
        }
    }
}
