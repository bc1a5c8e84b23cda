use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

/// The Solana RPC endpoint used when neither the config nor `RPC_URI` name one.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the service.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "lamports".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Where to find the Solana JSON-RPC node.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RpcConfig {
    /// The JSON-RPC endpoint. Defaults to `RPC_URI` from the environment.
    pub url: String,
    /// The timeout for a single balance lookup.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// The commitment level balances are read at.
    pub commitment: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: env::var("RPC_URI").unwrap_or_else(|_| DEFAULT_RPC_URL.into()),
            timeout: Duration::from_secs(10),
            commitment: "finalized".into(),
        }
    }
}

/// The storage behind the balance cache and the rate limit counters.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackend {
    /// A cache local to this process.
    Memory,
    /// A Redis server shared between instances.
    Redis {
        /// A `redis://` connection url.
        url: String,
    },
}

impl Default for CacheBackend {
    fn default() -> Self {
        match env::var("REDIS_URL") {
            Ok(url) if !url.is_empty() => CacheBackend::Redis { url },
            _ => CacheBackend::Memory,
        }
    }
}

/// Fine-tuning the cache.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Which storage to use.
    pub backend: CacheBackend,
    /// Maximum number of entries kept by the in-memory backend.
    pub capacity: u64,
    /// How long a fetched wallet balance is served from the cache.
    #[serde(with = "humantime_serde")]
    pub wallet_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            capacity: 100_000,
            wallet_ttl: Duration::from_secs(10),
        }
    }
}

/// Fine-tuning the request queue.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueSettings {
    /// How long a balance request may wait before it is given up on.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Per-client request limits.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether requests are limited at all.
    pub enabled: bool,
    /// Requests a single client may make per window.
    pub max_requests: u64,
    /// The length of a window, starting at a client's first request.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 10,
            window: Duration::from_secs(10 * 60),
        }
    }
}

/// An API key accepted by the service.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LicenseConfig {
    /// The value of the `x-api-key` header.
    pub key: String,
    /// A human readable name for the owner.
    pub name: String,
    /// The key is rejected after this point in time.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// The key is rejected once it was used this many times.
    #[serde(default)]
    pub usage_limit: Option<u64>,
    /// Inactive keys are rejected.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// The balance source.
    pub rpc: RpcConfig,

    /// Fine-tune the cache.
    pub cache: CacheConfig,

    /// Fine-tune the request queue.
    pub queue: QueueSettings,

    /// Per-client request limits.
    pub rate_limit: RateLimitConfig,

    /// The API keys accepted by the service.
    pub licenses: Vec<LicenseConfig>,
}

fn default_bind() -> String {
    match env::var("PORT") {
        Ok(port) if !port.is_empty() => format!("0.0.0.0:{port}"),
        _ => "0.0.0.0:3021".to_owned(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            rpc: RpcConfig::default(),
            cache: CacheConfig::default(),
            queue: QueueSettings::default(),
            rate_limit: RateLimitConfig::default(),
            licenses: Vec::new(),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
