//! The balance lookup service shared by all request handlers.
//!
//! Every wallet of a request is resolved through the coalescing queue, so a burst of requests
//! for the same wallet across all clients results in a single RPC call. The answers are
//! returned in the order the wallets were requested.

use std::sync::Arc;

use anyhow::{Context, Result};
use lamports_cache::{
    Cache, CoalescingQueue, Fetcher, MemoryCache, QueueConfig, Resolution, Resolver, TimedOut,
};
use serde::{Deserialize, Serialize};

use crate::config::{CacheBackend, Config};
use crate::licenses::Licenses;
use crate::metric;
use crate::ratelimit::RateLimiter;
use crate::rpc::SolanaRpc;

/// Whether a balance was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// The outcome of a lookup for a single wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub wallet: String,
    /// The balance in SOL, or the reason it could not be determined.
    pub balance: String,
    pub cache: CacheStatus,
}

impl WalletBalance {
    fn new(wallet: &str, outcome: Result<Resolution, TimedOut>) -> Self {
        let (balance, cache, tag) = match outcome {
            Ok(Resolution {
                error: Some(error), ..
            }) => (error.to_string(), CacheStatus::Miss, "error"),
            Ok(Resolution {
                value,
                cache_hit: true,
                ..
            }) => (value, CacheStatus::Hit, "hit"),
            Ok(Resolution { value, .. }) => (value, CacheStatus::Miss, "miss"),
            Err(TimedOut) => ("request timed out".to_owned(), CacheStatus::Miss, "timeout"),
        };
        metric!(counter("balance.lookup") += 1, "cache" => tag);

        Self {
            wallet: wallet.to_owned(),
            balance,
            cache,
        }
    }
}

#[derive(Debug)]
struct Inner {
    config: Config,
    resolver: Resolver,
    licenses: Licenses,
    rate_limiter: RateLimiter,
}

/// Resolves wallet balances and guards access to them.
///
/// Cloning the service is cheap and shares all state.
#[derive(Debug, Clone)]
pub struct BalanceService {
    inner: Arc<Inner>,
}

impl BalanceService {
    /// Creates the service with the cache backend and RPC endpoint named in `config`.
    pub fn create(config: Config) -> Result<Self> {
        let cache = open_cache(&config)?;
        let fetcher = SolanaRpc::new(&config.rpc).context("failed to create RPC client")?;
        tracing::info!(url = %config.rpc.url, "Using Solana RPC endpoint");
        Ok(Self::with_backends(config, cache, Arc::new(fetcher)))
    }

    /// Creates the service on top of the given backends.
    pub fn with_backends(config: Config, cache: Arc<dyn Cache>, fetcher: Arc<dyn Fetcher>) -> Self {
        let queue_config = QueueConfig {
            timeout: config.queue.timeout,
            value_ttl: config.cache.wallet_ttl,
            ..QueueConfig::default()
        };
        let queue = CoalescingQueue::new(cache.clone(), fetcher, queue_config);
        let licenses = Licenses::from_config(&config.licenses);
        let rate_limiter = RateLimiter::new(config.rate_limit, cache);

        Self {
            inner: Arc::new(Inner {
                resolver: Resolver::new(queue),
                licenses,
                rate_limiter,
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn licenses(&self) -> &Licenses {
        &self.inner.licenses
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    /// Looks up the balances of all `wallets`, in the order they are given.
    pub async fn get_balances(&self, wallets: &[String]) -> Vec<WalletBalance> {
        let outcomes = self.inner.resolver.request_all(wallets).await;
        wallets
            .iter()
            .zip(outcomes)
            .map(|(wallet, outcome)| WalletBalance::new(wallet, outcome))
            .collect()
    }
}

fn open_cache(config: &Config) -> Result<Arc<dyn Cache>> {
    match config.cache.backend {
        CacheBackend::Memory => {
            tracing::info!(capacity = config.cache.capacity, "Using in-memory cache");
            Ok(Arc::new(MemoryCache::new(config.cache.capacity)))
        }
        #[cfg(feature = "redis")]
        CacheBackend::Redis { ref url } => {
            let cache = lamports_cache::RedisCache::open(url).context("invalid redis url")?;
            tracing::info!("Using redis cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis { .. } => {
            anyhow::bail!("redis cache configured, but built without the `redis` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use lamports_cache::FetchError;

    use super::*;

    #[test]
    fn test_wallet_balance_outcomes() {
        let hit = WalletBalance::new("a", Ok(Resolution::hit("1.000000000".into())));
        assert_eq!(hit.balance, "1.000000000");
        assert_eq!(hit.cache, CacheStatus::Hit);

        let miss = WalletBalance::new("a", Ok(Resolution::fetched("2.000000000".into())));
        assert_eq!(miss.cache, CacheStatus::Miss);

        let failed = WalletBalance::new(
            "a",
            Ok(Resolution::failed(FetchError::InvalidKey("a".into()))),
        );
        assert_eq!(failed.balance, FetchError::InvalidKey("a".into()).to_string());
        assert_eq!(failed.cache, CacheStatus::Miss);

        let timed_out = WalletBalance::new("a", Err(TimedOut));
        assert_eq!(timed_out.balance, "request timed out");
        assert_eq!(timed_out.cache, CacheStatus::Miss);
    }

    #[test]
    fn test_serialization() {
        let balance = WalletBalance {
            wallet: "abc".into(),
            balance: "0.000000001".into(),
            cache: CacheStatus::Hit,
        };
        assert_eq!(
            serde_json::to_value(&balance).unwrap(),
            serde_json::json!({"wallet": "abc", "balance": "0.000000001", "cache": "hit"})
        );
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_redis_requires_feature() {
        let mut config = Config::default();
        config.cache.backend = CacheBackend::Redis {
            url: "redis://localhost".into(),
        };
        assert!(BalanceService::create(config).is_err());
    }
}
