//! Store configuration
//!
//! Loaded from a TOML file, with environment overrides for deployment-specific
//! values, and validated before a store is opened.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::merge::InconsistencyPolicy;
use crate::pipeline::PipelineConfig;
use crate::tiered_storage::EvictionPolicy;
use crate::utils::RetryPolicy;

/// Environment variable overriding `database_path`
pub const ENV_DATABASE_PATH: &str = "TIERLOG_DATABASE_PATH";
/// Environment variable overriding `log_level`
pub const ENV_LOG_LEVEL: &str = "TIERLOG_LOG_LEVEL";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration for a tiered log store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of entries resident in the hot cache
    pub hot_capacity: usize,
    /// Age after which entries leave the hot cache. 0 disables the age bound.
    pub retention_secs: u64,
    pub eviction_interval_ms: u64,
    /// Upper bound on entries moved by one eviction cycle
    pub eviction_batch_size: usize,
    /// Deadline for one range query. 0 disables it.
    pub query_timeout_ms: u64,
    /// Attempts per cold store write inside one eviction cycle
    pub eviction_retry_attempts: usize,
    pub inconsistency_policy: InconsistencyPolicy,
    pub database_path: String,
    pub pool_size: u32,
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hot_capacity: 10_000,
            retention_secs: 3600,
            eviction_interval_ms: 1000,
            eviction_batch_size: 1000,
            query_timeout_ms: 5000,
            eviction_retry_attempts: 3,
            inconsistency_policy: InconsistencyPolicy::Reject,
            database_path: "tierlog_cold.db".to_string(),
            pool_size: 10,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)?;

        // Override with environment variables if present
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse without applying environment overrides or validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse store config")
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(database_path) = std::env::var(ENV_DATABASE_PATH) {
            self.database_path = database_path;
        }
        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.eviction_interval_ms == 0 {
            return Err(StoreError::Config(
                "eviction_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.eviction_batch_size == 0 {
            return Err(StoreError::Config(
                "eviction_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.eviction_retry_attempts == 0 {
            return Err(StoreError::Config(
                "eviction_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(StoreError::Config(
                "pool_size must be greater than 0".to_string(),
            ));
        }
        if self.database_path.trim().is_empty() {
            return Err(StoreError::Config("database_path is empty".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(StoreError::Config(format!(
                "unknown log_level {:?}, expected one of {:?}",
                self.log_level, LOG_LEVELS
            )));
        }
        Ok(())
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            capacity: self.hot_capacity,
            retention: (self.retention_secs > 0).then(|| Duration::from_secs(self.retention_secs)),
            max_batch: self.eviction_batch_size,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            eviction: self.eviction_policy(),
            retry: RetryPolicy {
                max_attempts: self.eviction_retry_attempts,
                ..RetryPolicy::default()
            },
            eviction_interval: Duration::from_millis(self.eviction_interval_ms),
        }
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query_timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.inconsistency_policy, InconsistencyPolicy::Reject);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            hot_capacity = 50
            query_timeout_ms = 0
            inconsistency_policy = "prefer_cache"
            "#,
        )
        .unwrap();

        assert_eq!(config.hot_capacity, 50);
        assert_eq!(config.query_timeout(), None);
        assert_eq!(config.inconsistency_policy, InconsistencyPolicy::PreferCache);
        assert_eq!(config.pool_size, StoreConfig::default().pool_size);
    }

    #[test]
    fn test_zero_retention_disables_age_bound() {
        let config = StoreConfig {
            retention_secs: 0,
            ..StoreConfig::default()
        };
        assert_eq!(config.eviction_policy().retention, None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_batch = StoreConfig {
            eviction_batch_size: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(zero_batch.validate(), Err(StoreError::Config(_))));

        let bad_level = StoreConfig {
            log_level: "verbose".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(bad_level.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_pipeline_config_mapping() {
        let config = StoreConfig {
            hot_capacity: 7,
            eviction_batch_size: 3,
            eviction_retry_attempts: 5,
            eviction_interval_ms: 250,
            ..StoreConfig::default()
        };
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.eviction.capacity, 7);
        assert_eq!(pipeline.eviction.max_batch, 3);
        assert_eq!(pipeline.retry.max_attempts, 5);
        assert_eq!(pipeline.eviction_interval, Duration::from_millis(250));
    }
}
