//! Dispatcher configuration and the effective retry policy derived from it.
//!
//! # Design
//! `DispatcherConfig` is what embedders write down (JSON, or built in code).
//! It is never consulted directly while requests run: at construction the
//! dispatcher asks the capability source whether the platform is
//! constrained and calls `resolve`, which applies the platform ceilings and
//! produces an immutable `RetryPolicy`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::http::Headers;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_REQUEST_SPACING_MS: u64 = 100;

/// Timeout ceiling on constrained platforms.
pub const CONSTRAINED_TIMEOUT_CAP_SECS: u64 = 10;
/// Retry ceiling on constrained platforms.
pub const CONSTRAINED_MAX_RETRIES: u32 = 2;

const ENV_TIMEOUT_SECS: &str = "DISPATCH_TIMEOUT_SECS";
const ENV_MAX_RETRIES: &str = "DISPATCH_MAX_RETRIES";
const ENV_RETRY_DELAY_MS: &str = "DISPATCH_RETRY_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound for a single attempt, in seconds.
    pub request_timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed pause before each retry, in milliseconds.
    pub retry_delay_ms: u64,
    /// Pause between requests on constrained platforms, in milliseconds.
    pub request_spacing_ms: u64,
    pub app_name: String,
    pub app_version: String,
    /// Extra process-wide headers, applied on top of the built-in defaults.
    pub default_headers: Headers,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_spacing_ms: DEFAULT_REQUEST_SPACING_MS,
            app_name: "GameApp".to_string(),
            app_version: "1.0.0".to_string(),
            default_headers: Headers::new(),
        }
    }
}

impl DispatcherConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, DispatchError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| DispatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.request_timeout_secs == 0 {
            return Err(DispatchError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.app_name.trim().is_empty() {
            return Err(DispatchError::Config("app_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Overlay `DISPATCH_TIMEOUT_SECS`, `DISPATCH_MAX_RETRIES` and
    /// `DISPATCH_RETRY_DELAY_MS` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, DispatchError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_var(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_var(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_DELAY_MS) {
            self.retry_delay_ms = parse_var(ENV_RETRY_DELAY_MS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Apply platform ceilings. Constrained platforms never exceed a 10s
    /// timeout or 2 retries, and always space requests apart.
    pub fn resolve(&self, constrained: bool) -> RetryPolicy {
        if constrained {
            RetryPolicy {
                request_timeout: Duration::from_secs(
                    self.request_timeout_secs.min(CONSTRAINED_TIMEOUT_CAP_SECS),
                ),
                max_retries: self.max_retries.min(CONSTRAINED_MAX_RETRIES),
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                request_spacing: Some(Duration::from_millis(self.request_spacing_ms)),
            }
        } else {
            RetryPolicy {
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                max_retries: self.max_retries,
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                request_spacing: None,
            }
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DispatchError> {
    value
        .trim()
        .parse()
        .map_err(|_| DispatchError::Config(format!("{key}: invalid value {value:?}")))
}

/// Effective per-request limits after platform adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// `Some` only on constrained platforms.
    pub request_spacing: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        DispatcherConfig::default().resolve(false)
    }
}
