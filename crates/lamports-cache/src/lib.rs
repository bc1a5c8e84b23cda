//! Request coalescing and caching primitives for balance lookups.
//!
//! The central piece is the [`CoalescingQueue`]: every lookup for a key is queued behind a
//! single background worker for that key. The worker consults the [`Cache`] first and only
//! calls the [`Fetcher`] on a miss, so a burst of concurrent requests for the same key issues
//! at most one upstream call, and every request queued behind that call is answered from the
//! cache as soon as the value lands there.
//!
//! The [`Resolver`] is the caller-facing entry point on top of the queue.

#![warn(missing_docs)]

mod cache;
mod fetcher;
mod memory;
mod queue;
#[cfg(feature = "redis")]
mod redis_cache;
mod registry;
mod resolver;
mod waiter;

pub use cache::*;
pub use fetcher::*;
pub use memory::*;
pub use queue::*;
#[cfg(feature = "redis")]
pub use redis_cache::*;
pub use registry::*;
pub use resolver::*;
pub use waiter::*;
