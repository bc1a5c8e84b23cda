//! API keys and their usage accounting.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::LicenseConfig;
use crate::metric;

/// An API key along with its limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u64>,
    pub usage_count: u64,
    pub active: bool,
}

impl License {
    fn from_config(config: &LicenseConfig, now: DateTime<Utc>) -> Self {
        Self {
            key: config.key.clone(),
            name: config.name.clone(),
            created_at: now,
            expires_at: config.expires_at,
            usage_limit: config.usage_limit,
            usage_count: 0,
            active: config.active,
        }
    }

    fn check(&self, now: DateTime<Utc>) -> Result<(), LicenseError> {
        if !self.active {
            return Err(LicenseError::Unknown);
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(LicenseError::Expired);
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
        {
            return Err(LicenseError::UsageExceeded);
        }
        Ok(())
    }
}

/// Why an API key was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LicenseError {
    #[error("invalid license key")]
    Unknown,
    #[error("license expired")]
    Expired,
    #[error("license usage limit exceeded")]
    UsageExceeded,
}

impl LicenseError {
    fn as_tag(&self) -> &'static str {
        match self {
            LicenseError::Unknown => "unknown",
            LicenseError::Expired => "expired",
            LicenseError::UsageExceeded => "usage_exceeded",
        }
    }
}

/// The set of licenses accepted by the service.
///
/// Cloning shares the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct Licenses {
    licenses: Arc<RwLock<HashMap<String, License>>>,
}

impl Licenses {
    /// Creates a store holding the configured licenses.
    pub fn from_config(configs: &[LicenseConfig]) -> Self {
        let now = Utc::now();
        let licenses = configs
            .iter()
            .map(|config| (config.key.clone(), License::from_config(config, now)))
            .collect();
        Self {
            licenses: Arc::new(RwLock::new(licenses)),
        }
    }

    /// Looks up `key` and checks that it may be used right now.
    pub fn validate(&self, key: &str) -> Result<License, LicenseError> {
        let licenses = self.licenses.read().unwrap_or_else(|e| e.into_inner());
        let result = match licenses.get(key) {
            Some(license) => license.check(Utc::now()).map(|()| license.clone()),
            None => Err(LicenseError::Unknown),
        };
        if let Err(ref error) = result {
            metric!(counter("licenses.rejected") += 1, "reason" => error.as_tag());
        }
        result
    }

    /// Records one use of `key`. Unknown keys are ignored.
    pub fn increment_usage(&self, key: &str) {
        let mut licenses = self.licenses.write().unwrap_or_else(|e| e.into_inner());
        if let Some(license) = licenses.get_mut(key) {
            license.usage_count += 1;
        }
    }

    /// Mints a new license with a random key.
    pub fn create(
        &self,
        name: &str,
        expires_at: Option<DateTime<Utc>>,
        usage_limit: Option<u64>,
    ) -> License {
        let license = License {
            key: uuid::Uuid::new_v4().to_string(),
            name: name.to_owned(),
            created_at: Utc::now(),
            expires_at,
            usage_limit,
            usage_count: 0,
            active: true,
        };
        tracing::info!(owner = name, "Created license");
        let mut licenses = self.licenses.write().unwrap_or_else(|e| e.into_inner());
        licenses.insert(license.key.clone(), license.clone());
        license
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn config(key: &str) -> LicenseConfig {
        LicenseConfig {
            key: key.into(),
            name: "test".into(),
            expires_at: None,
            usage_limit: None,
            active: true,
        }
    }

    #[test]
    fn test_validate() {
        let licenses = Licenses::from_config(&[config("abc")]);
        let license = licenses.validate("abc").unwrap();
        assert_eq!(license.name, "test");
        assert_eq!(licenses.validate("def"), Err(LicenseError::Unknown));
    }

    #[test]
    fn test_expired() {
        let mut expired = config("old");
        expired.expires_at = Some(Utc::now() - Duration::seconds(1));
        let mut current = config("new");
        current.expires_at = Some(Utc::now() + Duration::hours(1));

        let licenses = Licenses::from_config(&[expired, current]);
        assert_eq!(licenses.validate("old"), Err(LicenseError::Expired));
        assert!(licenses.validate("new").is_ok());
    }

    #[test]
    fn test_usage_limit() {
        let mut limited = config("abc");
        limited.usage_limit = Some(2);
        let licenses = Licenses::from_config(&[limited]);

        licenses.increment_usage("abc");
        assert!(licenses.validate("abc").is_ok());
        licenses.increment_usage("abc");
        assert_eq!(licenses.validate("abc"), Err(LicenseError::UsageExceeded));

        // unknown keys are not an error
        licenses.increment_usage("def");
    }

    #[test]
    fn test_inactive() {
        let mut inactive = config("abc");
        inactive.active = false;
        let licenses = Licenses::from_config(&[inactive]);
        assert_eq!(licenses.validate("abc"), Err(LicenseError::Unknown));
    }

    #[test]
    fn test_create() {
        let licenses = Licenses::default();
        let license = licenses.create("Carol", None, Some(1));
        assert_eq!(license.key.len(), 36);
        assert_eq!(licenses.validate(&license.key), Ok(license.clone()));

        let other = licenses.create("Carol", None, None);
        assert_ne!(license.key, other.key);
    }
}
