//! Configuration resolution and graceful degradation tests
//!
//! Covers:
//! - Missing config files fall back to defaults instead of failing
//! - Explicit path beats `LPD_CONFIG`
//! - Environment overrides for base URL and user id
//! - Round trip through `write_config`
//!
//! Tests that manipulate process environment variables are marked
//! `#[serial]` so they never run in parallel.

use lpd_common::config::{
    write_config, DashboardConfig, API_BASE_URL_ENV_VAR, CONFIG_ENV_VAR, USER_ID_ENV_VAR,
};
use lpd_common::logging;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(API_BASE_URL_ENV_VAR);
    env::remove_var(USER_ID_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_file_uses_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");

    let config = DashboardConfig::load(Some(&missing)).unwrap();

    assert_eq!(config, DashboardConfig::default());
}

#[test]
#[serial]
fn test_explicit_file_is_loaded() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
        api_base_url = "http://learning.internal:8080"
        integrity_mode = true

        [selection]
        debounce_ms = 50
        "#,
    )
    .unwrap();

    let config = DashboardConfig::load(Some(&path)).unwrap();

    assert_eq!(config.api_base_url, "http://learning.internal:8080");
    assert!(config.integrity_mode);
    assert_eq!(config.selection.debounce_ms, 50);
    assert_eq!(config.selection.retry_attempts, 3);
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("from-env.toml");
    fs::write(&path, "user_id = \"env-file-user\"\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = DashboardConfig::load(None).unwrap();
    clear_env();

    assert_eq!(config.user_id, "env-file-user");
}

#[test]
#[serial]
fn test_explicit_path_beats_env_var() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let explicit = dir.path().join("explicit.toml");
    let from_env = dir.path().join("env.toml");
    fs::write(&explicit, "user_id = \"explicit\"\n").unwrap();
    fs::write(&from_env, "user_id = \"from-env\"\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let config = DashboardConfig::load(Some(&explicit)).unwrap();
    clear_env();

    assert_eq!(config.user_id, "explicit");
}

#[test]
#[serial]
fn test_env_overrides_apply_after_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "user_id = \"file-user\"\n").unwrap();
    env::set_var(USER_ID_ENV_VAR, "override-user");
    env::set_var(API_BASE_URL_ENV_VAR, "http://override.test");

    let config = DashboardConfig::load(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.user_id, "override-user");
    assert_eq!(config.api_base_url, "http://override.test");
}

#[test]
#[serial]
fn test_blank_env_override_is_ignored() {
    clear_env();
    env::set_var(USER_ID_ENV_VAR, "   ");
    let mut config = DashboardConfig::default();

    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.user_id, "default-user");
}

#[test]
#[serial]
fn test_malformed_file_fails_load() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[reconnect\nmax_attempts = 2").unwrap();

    assert!(DashboardConfig::load(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_invalid_values_fail_load() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("invalid.toml");
    fs::write(&path, "[progress]\nmilestones = [0, 50]\n").unwrap();

    assert!(DashboardConfig::load(Some(&path)).is_err());
}

#[test]
fn test_write_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = DashboardConfig::default();
    config.user_id = "round-trip".to_string();
    config.progress.milestones = vec![10, 90];

    write_config(&config, &path).unwrap();
    let loaded = DashboardConfig::from_file(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_logging_init_to_file_then_rejects_second_install() {
    let dir = TempDir::new().unwrap();
    let mut logging_config = DashboardConfig::default().logging;
    logging_config.file = Some(dir.path().join("engine.log"));

    logging::init(&logging_config).unwrap();
    tracing::info!("logging initialized for test");

    assert!(dir.path().join("engine.log").exists());
    assert!(logging::init(&logging_config).is_err());
}
