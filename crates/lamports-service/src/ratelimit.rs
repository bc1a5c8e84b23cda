//! Per-client request limits.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lamports_cache::{Cache, CacheError};

use crate::config::RateLimitConfig;
use crate::metric;

const KEY_PREFIX: &str = "ip_request_count:";

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The client used up its budget for the current window.
    #[error("rate limit exceeded, retry in {}s", .retry_after.as_secs())]
    TooManyRequests { retry_after: Duration },
    /// The counter could not be stored.
    #[error("failed to record request")]
    Storage(#[source] CacheError),
}

/// The stored state of one client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    count: u64,
    /// Unix timestamp in milliseconds.
    ends_at: i64,
}

impl Window {
    fn parse(value: &str) -> Option<Self> {
        let (count, ends_at) = value.split_once(':')?;
        Some(Self {
            count: count.parse().ok()?,
            ends_at: ends_at.parse().ok()?,
        })
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.count, self.ends_at)
    }
}

/// A fixed window counter per client, kept in a [`Cache`].
///
/// A window starts with the first request of a client and is not extended by later ones.
/// Reading and updating the counter are two separate cache operations, so concurrent requests
/// of a single client may be slightly undercounted.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    cache: Arc<dyn Cache>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, cache: Arc<dyn Cache>) -> Self {
        Self { config, cache }
    }

    /// Counts a request of `client`, rejecting it if the client is over its limit.
    pub async fn check(&self, client: &str) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = format!("{KEY_PREFIX}{client}");
        let now = Utc::now().timestamp_millis();

        let window = self
            .cache
            .get(&key)
            .await
            .and_then(|value| Window::parse(&value))
            .filter(|window| window.ends_at > now);
        let window = window.unwrap_or_else(|| Window {
            count: 0,
            ends_at: now.saturating_add(self.config.window.as_millis() as i64),
        });

        let remaining = Duration::from_millis((window.ends_at - now).max(1) as u64);
        if window.count >= self.config.max_requests {
            tracing::debug!(client, count = window.count, "Rate limit exceeded");
            metric!(counter("rate_limit.rejected") += 1);
            return Err(RateLimitError::TooManyRequests {
                retry_after: remaining,
            });
        }

        let updated = Window {
            count: window.count + 1,
            ..window
        };
        self.cache
            .set(&key, &updated.encode(), remaining)
            .await
            .map_err(RateLimitError::Storage)
    }
}
