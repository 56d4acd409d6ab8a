//! Observability module - structured logging setup
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a `fmt`
//! layer. `RUST_LOG` wins when set; otherwise the configured level applies.
//! Store metrics live in [`crate::tiered_storage::StoreMetrics`], one
//! prometheus registry per store.
//!
//! # Usage
//! ```no_run
//! use tierlog::observability::init_observability;
//!
//! init_observability(None).expect("Failed to initialize observability");
//! ```

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::StoreConfig;

/// Configuration for the logging layer
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name reported at startup
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Filter used when `RUST_LOG` is not set (e.g. "info", "tierlog=debug")
    pub log_level: String,
    /// Include file and line number in every event
    pub with_source_location: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "tierlog".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            with_source_location: true,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_store_config(config: &StoreConfig) -> Self {
        Self {
            log_level: config.log_level.clone(),
            ..Self::default()
        }
    }
}

/// Initialize the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
///
/// # Arguments
/// * `config` - Optional configuration. If None, uses default configuration
pub fn init_observability(config: Option<ObservabilityConfig>) -> Result<()> {
    let config = config.unwrap_or_default();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("Invalid log filter: {}", config.log_level))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(config.with_source_location)
        .with_line_number(config.with_source_location);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        "Observability initialized: service={}, version={}, level={}",
        config.service_name,
        config.service_version,
        config.log_level
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "tierlog");
        assert_eq!(config.log_level, "info");
        assert!(config.with_source_location);
    }

    #[test]
    fn test_from_store_config() {
        let store_config = StoreConfig {
            log_level: "debug".to_string(),
            ..StoreConfig::default()
        };
        let config = ObservabilityConfig::from_store_config(&store_config);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_name, "tierlog");
    }
}
