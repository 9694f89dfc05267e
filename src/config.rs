//! Engine configuration.
//!
//! The configuration is serializable and loadable from JSON or TOML while
//! keeping complexity minimal.

use serde::{Deserialize, Serialize};
use serde::de::Error;
use std::time::Duration;

/// Synchronization policy for the write-ahead log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Never sync to disk (fastest, least safe)
    Never,
    /// Sync every second (recommended default)
    #[default]
    EverySecond,
    /// Sync after every write (slowest, safest)
    Always,
}

/// File synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Call `fsync` / `File::sync_all` to persist metadata + data.
    #[default]
    All,
    /// Call `fdatasync` / `File::sync_data` to persist data only.
    Data,
}

/// Engine configuration.
///
/// # Example
///
/// ```rust
/// use chronica::{Config, SyncPolicy};
///
/// let config = Config::default();
///
/// let json = r#"{
///     "sync_policy": "always",
///     "retention_seconds": 86400
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often the write-ahead log is synced to disk.
    #[serde(default)]
    pub sync_policy: SyncPolicy,

    /// Controls whether the engine issues `fsync` or `fdatasync`.
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Number of writes to batch before forcing a sync when `SyncPolicy::Always`.
    #[serde(default = "Config::default_sync_batch_size")]
    pub sync_batch_size: usize,

    /// Write-lock acquisition timeout in milliseconds. Exceeding it surfaces
    /// a `ConcurrencyConflict` for the caller's retry policy.
    #[serde(default = "Config::default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Retention horizon for closed versions in seconds (None keeps history
    /// forever). Only `apply_retention` consults this; nothing is destroyed
    /// implicitly.
    #[serde(default)]
    pub retention_seconds: Option<f64>,
}

impl Config {
    const fn default_sync_batch_size() -> usize {
        1
    }

    const fn default_lock_timeout_ms() -> u64 {
        5_000
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Adjust the number of writes to batch before syncing when `SyncPolicy::Always`.
    pub fn with_sync_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "Sync batch size must be greater than zero");
        self.sync_batch_size = batch_size;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_seconds = Some(retention.as_secs_f64());
        self
    }

    /// Get the retention horizon as a Duration.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_seconds.and_then(|secs| {
            if secs.is_finite() && secs > 0.0 && secs <= u64::MAX as f64 {
                Some(Duration::from_secs_f64(secs))
            } else {
                None
            }
        })
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(secs) = self.retention_seconds {
            if !secs.is_finite() {
                return Err("Retention must be finite (not NaN or infinity)".to_string());
            }
            if secs <= 0.0 {
                return Err("Retention must be positive".to_string());
            }
            if secs > u64::MAX as f64 {
                return Err("Retention is too large".to_string());
            }
        }

        if self.sync_batch_size == 0 {
            return Err("Sync batch size must be greater than zero".to_string());
        }

        if self.lock_timeout_ms == 0 {
            return Err("Lock timeout must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from a TOML string (requires the `toml` feature).
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a TOML string (requires the `toml` feature).
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_policy: SyncPolicy::default(),
            sync_mode: SyncMode::default(),
            sync_batch_size: Self::default_sync_batch_size(),
            lock_timeout_ms: Self::default_lock_timeout_ms(),
            retention_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.sync_policy, SyncPolicy::EverySecond);
        assert_eq!(config.sync_mode, SyncMode::All);
        assert_eq!(config.sync_batch_size, 1);
        assert_eq!(config.lock_timeout_ms, 5_000);
        assert!(config.retention_seconds.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_sync_policy(SyncPolicy::Always)
            .with_sync_mode(SyncMode::Data)
            .with_sync_batch_size(8)
            .with_retention(Duration::from_secs(3600));

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();

        assert_eq!(deserialized.sync_policy, SyncPolicy::Always);
        assert_eq!(deserialized.sync_mode, SyncMode::Data);
        assert_eq!(deserialized.sync_batch_size, 8);
        assert_eq!(deserialized.retention().unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_config_retention_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.retention_seconds = Some(-1.0);
        assert!(config.validate().is_err());

        config.retention_seconds = Some(0.0);
        assert!(config.validate().is_err());

        config.retention_seconds = Some(f64::NAN);
        assert!(config.validate().is_err());

        config.retention_seconds = Some(f64::INFINITY);
        assert!(config.validate().is_err());

        config.retention_seconds = Some(1e20);
        assert!(config.validate().is_err());

        config.retention_seconds = Some(60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_retention_safe_conversion() {
        let mut config = Config::default().with_retention(Duration::from_secs(60));
        assert!(config.retention().is_some());

        config.retention_seconds = Some(f64::NAN);
        assert!(config.retention().is_none());

        config.retention_seconds = Some(-1.0);
        assert!(config.retention().is_none());

        config.retention_seconds = Some(1e20);
        assert!(config.retention().is_none());
    }

    #[test]
    fn test_config_invalid_batch_and_timeout() {
        let mut config = Config::default();
        config.sync_batch_size = 0;
        assert!(config.validate().is_err());

        config.sync_batch_size = 1;
        config.lock_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default().with_retention(Duration::from_secs(120));
        let toml_str = config.to_toml().unwrap();
        let back = Config::from_toml(&toml_str).unwrap();
        assert_eq!(back.retention(), config.retention());
    }
}
