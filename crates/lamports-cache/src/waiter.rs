use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::FetchError;

/// The answer delivered to a single queued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The value, empty if the lookup failed.
    pub value: String,
    /// Whether this particular request was answered from the cache.
    pub cache_hit: bool,
    /// The upstream error shared by every request that waited on a failed lookup.
    pub error: Option<FetchError>,
}

impl Resolution {
    /// A value read from the cache.
    pub fn hit(value: String) -> Self {
        Self {
            value,
            cache_hit: true,
            error: None,
        }
    }

    /// A value freshly fetched from upstream.
    pub fn fetched(value: String) -> Self {
        Self {
            value,
            cache_hit: false,
            error: None,
        }
    }

    /// A failed upstream lookup.
    pub fn failed(error: FetchError) -> Self {
        Self {
            value: String::new(),
            cache_hit: false,
            error: Some(error),
        }
    }
}

/// The request was removed from its queue because its deadline passed before it was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request timed out while waiting in the queue")]
pub struct TimedOut;

/// Identifies a single queued request, independent of where it lives in memory.
///
/// Ids are allocated in increasing order, so ordering by id is ordering by arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(pub(crate) u64);

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The registry side of a queued request: the sending half of its delivery slot.
pub(crate) struct Waiter {
    sender: oneshot::Sender<Resolution>,
    enqueued_at: Instant,
    timer: Option<AbortHandle>,
}

impl Waiter {
    pub(crate) fn new(sender: oneshot::Sender<Resolution>) -> Self {
        Self {
            sender,
            enqueued_at: Instant::now(),
            timer: None,
        }
    }

    pub(crate) fn set_timer(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    /// Fulfills the delivery slot and stops the pending timeout.
    pub(crate) fn deliver(self, id: WaiterId, resolution: Resolution) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        let waited = self.enqueued_at.elapsed();
        if self.sender.send(resolution).is_err() {
            tracing::trace!(waiter = %id, ?waited, "Caller went away before delivery");
        } else {
            tracing::trace!(waiter = %id, ?waited, "Delivered resolution");
        }
    }

    /// Closes the delivery slot without a value.
    pub(crate) fn cancel(self) {
        drop(self.sender);
    }
}

/// The caller side of a queued request.
///
/// Resolves once the worker for the key delivers a [`Resolution`], or with [`TimedOut`] if the
/// request was cancelled by its deadline first.
#[derive(Debug)]
#[must_use = "a queued request does nothing unless awaited"]
pub struct WaiterHandle {
    id: WaiterId,
    receiver: oneshot::Receiver<Resolution>,
}

impl WaiterHandle {
    pub(crate) fn new(id: WaiterId, receiver: oneshot::Receiver<Resolution>) -> Self {
        Self { id, receiver }
    }

    /// The id of the queued request.
    pub fn id(&self) -> WaiterId {
        self.id
    }
}

impl Future for WaiterHandle {
    type Output = Result<Resolution, TimedOut>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_closed| TimedOut))
    }
}
