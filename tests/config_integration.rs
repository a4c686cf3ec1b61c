//! The configuration shipped in `config/` loads, validates and drives the
//! engine settings and job registry.

use govsync_core::config::ConfigManager;
use govsync_core::constants::jobs;
use govsync_core::destination::RefreshMode;
use govsync_core::engine::EngineSettings;
use govsync_core::jobs::JobRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn config_dir() -> Option<PathBuf> {
    Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config"))
}

#[test]
fn test_shipped_test_environment_loads() {
    let manager = ConfigManager::load_from_directory_with_env(config_dir(), "test").unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "test");
    assert_eq!(config.sync.retry_delay_ms, 10);
    assert_eq!(config.sync.max_retries, 3);
    assert!(!config.destination.run_migrations);
    assert_eq!(config.source_registry().names(), vec!["primary", "secondary"]);
    assert_eq!(config.job_batch_size(jobs::PROPOSAL_VOTES), 25);
    assert_eq!(config.job_interval(jobs::TOTALS), Duration::from_secs(3600));

    let settings = EngineSettings::from_config(config);
    assert_eq!(settings.fan_out.inter_batch_delay, Duration::ZERO);
    assert_eq!(settings.refresh_mode, RefreshMode::DeleteThenInsert);

    let registry = JobRegistry::from_config(config);
    assert_eq!(registry.names(), jobs::ALL.to_vec());
}

#[test]
fn test_shipped_production_environment_uses_atomic_refresh() {
    let manager = ConfigManager::load_from_directory_with_env(config_dir(), "production").unwrap();
    assert_eq!(manager.config().destination.refresh_mode, RefreshMode::Atomic);
}

#[test]
fn test_overrides_disable_a_job_and_reorder_failover() {
    let overrides = HashMap::from([
        ("GOVSYNC__JOBS__DREPS__ENABLED".to_string(), "false".to_string()),
        (
            "GOVSYNC__SYNC__FAILOVER_ORDER".to_string(),
            "secondary,primary".to_string(),
        ),
    ]);
    let manager = ConfigManager::load_with_overrides(config_dir(), "test", Some(overrides)).unwrap();
    let config = manager.config();

    assert_eq!(config.source_registry().names(), vec!["secondary", "primary"]);
    let registry = JobRegistry::from_config(config);
    assert!(registry.get(jobs::DREPS).is_none());
    assert_eq!(registry.names().len(), jobs::ALL.len() - 1);
}

#[test]
fn test_debug_config_never_exposes_destination_credentials() {
    let manager = ConfigManager::load_from_directory_with_env(config_dir(), "test").unwrap();
    let rendered = manager.debug_config().to_string();
    assert!(!rendered.contains("govsync:govsync@"));
}
