//! Tests for configuration resolution
//!
//! Tests that touch SPARKIFY_* environment variables are marked #[serial]
//! so they never run in parallel with each other.

use serial_test::serial;
use sparkify_common::config::{
    ConfigOverrides, EtlConfig, TomlConfig, ENV_DATABASE_URL, ENV_STAGING_BATCH_ROWS,
    ENV_UNRESOLVED_POLICY,
};
use sparkify_common::UnresolvedPolicy;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    for name in [
        ENV_DATABASE_URL,
        ENV_STAGING_BATCH_ROWS,
        ENV_UNRESOLVED_POLICY,
        "SPARKIFY_CATALOG_DIR",
        "SPARKIFY_ACTIVITY_DIR",
        "SPARKIFY_LOG_LEVEL",
        "SPARKIFY_CONFIG",
    ] {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_defaults_when_nothing_configured() {
    clear_env();

    let config = EtlConfig::resolve_with(&ConfigOverrides::default(), &TomlConfig::default()).unwrap();

    assert_eq!(config.database_url, "sqlite://sparkify.db");
    assert_eq!(config.catalog_dir, PathBuf::from("data/song_data"));
    assert_eq!(config.activity_dir, PathBuf::from("data/log_data"));
    assert_eq!(config.unresolved_policy, UnresolvedPolicy::Admit);
    assert_eq!(config.staging_batch_rows, 100);
    assert_eq!(config.log_level, "info");
}

#[test]
#[serial]
fn test_toml_overrides_defaults() {
    clear_env();

    let toml_config: TomlConfig = toml::from_str(
        r#"
        database_url = "sqlite://from-toml.db"
        unresolved_policy = "reject"
        staging_batch_rows = 25

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    let config = EtlConfig::resolve_with(&ConfigOverrides::default(), &toml_config).unwrap();

    assert_eq!(config.database_url, "sqlite://from-toml.db");
    assert_eq!(config.unresolved_policy, UnresolvedPolicy::Reject);
    assert_eq!(config.staging_batch_rows, 25);
    assert_eq!(config.log_level, "debug");
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    env::set_var(ENV_DATABASE_URL, "sqlite://from-env.db");
    env::set_var(ENV_UNRESOLVED_POLICY, "admit");

    let toml_config = TomlConfig {
        database_url: Some("sqlite://from-toml.db".to_string()),
        unresolved_policy: Some(UnresolvedPolicy::Reject),
        ..Default::default()
    };

    let config = EtlConfig::resolve_with(&ConfigOverrides::default(), &toml_config).unwrap();

    assert_eq!(config.database_url, "sqlite://from-env.db");
    assert_eq!(config.unresolved_policy, UnresolvedPolicy::Admit);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_DATABASE_URL, "sqlite://from-env.db");

    let overrides = ConfigOverrides {
        database_url: Some("sqlite://from-cli.db".to_string()),
        ..Default::default()
    };

    let config = EtlConfig::resolve_with(&overrides, &TomlConfig::default()).unwrap();
    assert_eq!(config.database_url, "sqlite://from-cli.db");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_values_are_config_errors() {
    clear_env();
    env::set_var(ENV_STAGING_BATCH_ROWS, "many");
    assert!(EtlConfig::resolve_with(&ConfigOverrides::default(), &TomlConfig::default()).is_err());

    clear_env();
    env::set_var(ENV_UNRESOLVED_POLICY, "sometimes");
    assert!(EtlConfig::resolve_with(&ConfigOverrides::default(), &TomlConfig::default()).is_err());

    clear_env();
}

#[test]
#[serial]
fn test_zero_batch_rows_rejected() {
    clear_env();
    let overrides = ConfigOverrides {
        staging_batch_rows: Some(0),
        ..Default::default()
    };
    assert!(EtlConfig::resolve_with(&overrides, &TomlConfig::default()).is_err());
}

#[test]
#[serial]
fn test_explicit_config_file_loaded() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("etl.toml");
    std::fs::write(&path, "catalog_dir = \"/srv/catalog\"\n").unwrap();

    let overrides = ConfigOverrides {
        config_path: Some(path),
        ..Default::default()
    };
    let config = EtlConfig::resolve(&overrides).unwrap();

    assert_eq!(config.catalog_dir, PathBuf::from("/srv/catalog"));
}

#[test]
#[serial]
fn test_missing_explicit_config_file_is_error() {
    clear_env();
    let overrides = ConfigOverrides {
        config_path: Some(PathBuf::from("/nonexistent/sparkify/etl.toml")),
        ..Default::default()
    };
    assert!(EtlConfig::resolve(&overrides).is_err());
}
