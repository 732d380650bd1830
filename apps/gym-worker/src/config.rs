//! Worker configuration module.
//!
//! Configuration is loaded from `GYM_*` environment variables with fallback
//! to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gym_db::DbConfig;
use gym_engine::EngineConfig;

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Connection pool size
    pub max_connections: u32,

    /// Seconds between membership expiry sweeps
    pub sweep_interval_secs: u64,

    /// Seconds between reconciliation passes
    pub reconcile_interval_secs: u64,

    /// A pending or cancelling sale untouched for this long is settled
    pub stale_after_secs: u64,

    /// Conditional-write attempts per stock delta
    pub max_attempts: u32,

    /// Upper bound on a single store call, in milliseconds
    pub store_timeout_ms: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = WorkerConfig {
            database_path: lookup("GYM_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./gym.db")),

            max_connections: parse(&lookup, "GYM_DB_MAX_CONNECTIONS", 5)?,

            sweep_interval_secs: parse(&lookup, "GYM_SWEEP_INTERVAL_SECS", 3600)?,

            reconcile_interval_secs: parse(&lookup, "GYM_RECONCILE_INTERVAL_SECS", 60)?,

            stale_after_secs: parse(&lookup, "GYM_STALE_AFTER_SECS", 300)?,

            max_attempts: parse(&lookup, "GYM_MAX_ATTEMPTS", 3)?,

            store_timeout_ms: parse(&lookup, "GYM_STORE_TIMEOUT_MS", 5000)?,
        };

        if config.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("GYM_SWEEP_INTERVAL_SECS".to_string()));
        }
        if config.reconcile_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "GYM_RECONCILE_INTERVAL_SECS".to_string(),
            ));
        }
        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("GYM_DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone()).max_connections(self.max_connections)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .max_attempts(self.max_attempts)
            .store_timeout(Duration::from_millis(self.store_timeout_ms))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, PathBuf::from("./gym.db"));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.stale_after(), Duration::from_secs(300));
        assert_eq!(config.engine_config().max_attempts, 3);
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("GYM_DB_PATH", "/var/lib/gym/gym.db"),
            ("GYM_RECONCILE_INTERVAL_SECS", " 15 "),
            ("GYM_STORE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.db_config().database_path, PathBuf::from("/var/lib/gym/gym.db"));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(15));
        assert_eq!(config.engine_config().store_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        let err = WorkerConfig::from_lookup(lookup(&[("GYM_MAX_ATTEMPTS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key) if key == "GYM_MAX_ATTEMPTS"));

        let err =
            WorkerConfig::from_lookup(lookup(&[("GYM_SWEEP_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
