//! Engine configuration from environment variables or host properties.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_types::{keys, Properties};
use std::env;
use std::time::Duration;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Factory components also create instances from factory configurations
    pub factory_enabled: bool,

    /// Delayed components stay active after their last consumer leaves
    pub keep_instances: bool,

    /// Upper bound for one activation, and for each service acquisition
    pub lock_timeout_ms: u64,

    /// Publish the management console as a service
    pub info_as_service: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "error".to_string(),
            factory_enabled: false,
            keep_instances: false,
            lock_timeout_ms: 5000,
            info_as_service: false,
        }
    }
}

/// Serializable view returned by the management `config` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub log_level: String,
    pub factory_enabled: bool,
    pub keep_instances: bool,
    pub lock_timeout_ms: u64,
    pub info_as_service: bool,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DS_LOG_LEVEL`: Log level (default: error)
    /// - `DS_FACTORY_ENABLED`: Factory configurations (default: false)
    /// - `DS_DELAYED_KEEP_INSTANCES`: Keep delayed instances (default: false)
    /// - `DS_LOCK_TIMEOUT_MILLISECONDS`: Lock timeout (default: 5000)
    /// - `DS_INFO_SERVICE`: Info service (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("DS_LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_level),

            factory_enabled: env::var("DS_FACTORY_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.factory_enabled),

            keep_instances: env::var("DS_DELAYED_KEEP_INSTANCES")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.keep_instances),

            lock_timeout_ms: env::var("DS_LOCK_TIMEOUT_MILLISECONDS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.lock_timeout_ms),

            info_as_service: env::var("DS_INFO_SERVICE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.info_as_service),
        }
    }

    /// Read settings from a host property bag using the `ds.*` keys.
    /// Absent keys keep their defaults; malformed values are rejected.
    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = properties.get(keys::DS_LOG_LEVEL) {
            config.log_level = value.to_string().to_lowercase();
        }
        config.factory_enabled = flag(properties, keys::DS_FACTORY_ENABLED)?
            .unwrap_or(config.factory_enabled);
        config.keep_instances =
            flag(properties, keys::DS_KEEP_INSTANCES)?.unwrap_or(config.keep_instances);
        config.info_as_service =
            flag(properties, keys::DS_INFO_SERVICE)?.unwrap_or(config.info_as_service);

        if let Some(value) = properties.get(keys::DS_LOCK_TIMEOUT) {
            let millis = value
                .as_number()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: keys::DS_LOCK_TIMEOUT.to_string(),
                    value: value.to_string(),
                })?;
            config.lock_timeout_ms = millis;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::ZeroLockTimeout);
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::UnknownLogLevel(self.log_level.clone()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            log_level: self.log_level.clone(),
            factory_enabled: self.factory_enabled,
            keep_instances: self.keep_instances,
            lock_timeout_ms: self.lock_timeout_ms,
            info_as_service: self.info_as_service,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn flag(properties: &Properties, key: &str) -> Result<Option<bool>, ConfigError> {
    match properties.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
    }
}
