//! Integration tests for configuration loading.

use tierlog::config::{ENV_DATABASE_PATH, ENV_LOG_LEVEL};
use tierlog::{InconsistencyPolicy, StoreConfig};

fn temp_config_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tierlog_{}_{}.toml", name, rand::random::<u64>()))
}

#[test]
fn test_config_file_roundtrip_with_env_overrides() {
    let path = temp_config_path("roundtrip");
    let original = StoreConfig {
        hot_capacity: 256,
        retention_secs: 120,
        query_timeout_ms: 0,
        inconsistency_policy: InconsistencyPolicy::PreferCache,
        database_path: "from_file.db".to_string(),
        ..StoreConfig::default()
    };
    original.to_toml_file(&path).unwrap();

    // Only this test touches these variables
    std::env::set_var(ENV_DATABASE_PATH, "/var/lib/tierlog/cold.db");
    std::env::set_var(ENV_LOG_LEVEL, "debug");
    let loaded = StoreConfig::from_toml_file(&path);
    std::env::remove_var(ENV_DATABASE_PATH);
    std::env::remove_var(ENV_LOG_LEVEL);

    let loaded = loaded.unwrap();
    assert_eq!(loaded.hot_capacity, 256);
    assert_eq!(loaded.retention_secs, 120);
    assert_eq!(loaded.query_timeout(), None);
    assert_eq!(loaded.inconsistency_policy, InconsistencyPolicy::PreferCache);
    assert_eq!(loaded.database_path, "/var/lib/tierlog/cold.db");
    assert_eq!(loaded.log_level, "debug");

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let path = temp_config_path("invalid");
    std::fs::write(&path, "eviction_interval_ms = 0\n").unwrap();

    let err = StoreConfig::from_toml_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("eviction_interval_ms"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_unknown_policy_is_a_parse_error() {
    let err = StoreConfig::from_toml_str("inconsistency_policy = \"newest_wins\"").unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse store config"));
}

#[test]
fn test_missing_file_reports_path() {
    let err = StoreConfig::from_toml_file("/nonexistent/tierlog.toml").unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/tierlog.toml"));
}
