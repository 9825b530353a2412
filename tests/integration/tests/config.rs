//! Configuration loading tests
//!
//! Environment overrides are process-global, so these tests run serially.

use anyhow::Result;
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tvplay::player::{PlaybackController, PlaybackStatus};
use tvplay::sim::{SimulatedFactory, SimulatedSink};
use tvplay::{ManualClock, PlaybackConfig, PlaybackError};

const ENV_VARS: [&str; 4] = [
    "TVPLAY_WATCHDOG_INTERVAL_MS",
    "TVPLAY_MAX_NETWORK_RETRIES",
    "TVPLAY_SEEK_STEP_SECS",
    "TVPLAY_LOG_LEVEL",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, contents: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("config.toml");
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
#[serial]
fn test_load_from_file() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[watchdog]
interval_ms = 5000

[recovery]
max_network_retries = 5
network_retry_delay_ms = 1500
"#,
    )?;

    let config = PlaybackConfig::load_from(&path)?;
    assert_eq!(config.watchdog.interval_ms, 5_000);
    assert_eq!(config.recovery.max_network_retries, 5);
    assert_eq!(config.recovery.network_retry_delay_ms, 1_500);
    assert_eq!(config.hygiene.interval_ms, 120_000);
    Ok(())
}

#[test]
#[serial]
fn test_env_overrides_file() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[recovery]\nmax_network_retries = 5\n")?;

    std::env::set_var("TVPLAY_MAX_NETWORK_RETRIES", "7");
    std::env::set_var("TVPLAY_SEEK_STEP_SECS", "30");
    std::env::set_var("TVPLAY_LOG_LEVEL", "debug");
    let config = PlaybackConfig::load_from(&path);
    clear_env();

    let config = config?;
    assert_eq!(config.recovery.max_network_retries, 7);
    assert_eq!(config.transport.seek_step_secs, 30.0);
    assert_eq!(config.general.log_level, "debug");
    Ok(())
}

#[test]
#[serial]
fn test_invalid_env_value_is_rejected() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = write_config(&dir, "")?;

    std::env::set_var("TVPLAY_WATCHDOG_INTERVAL_MS", "soon");
    let result = PlaybackConfig::load_from(&path);
    clear_env();

    assert!(matches!(result, Err(PlaybackError::Config(_))));
    Ok(())
}

#[test]
#[serial]
fn test_invalid_file_is_rejected() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;

    let path = write_config(&dir, "[watchdog]\ninterval_ms = \"often\"\n")?;
    assert!(matches!(PlaybackConfig::load_from(&path), Err(PlaybackError::Config(_))));

    let path = write_config(&dir, "[general]\nlog_level = \"loud\"\n")?;
    assert!(matches!(PlaybackConfig::load_from(&path), Err(PlaybackError::Config(_))));
    Ok(())
}

#[test]
#[serial]
fn test_save_then_load() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = dir.path().join("tvplay").join("config.toml");

    let mut config = PlaybackConfig::default();
    config.hygiene.keep_behind_secs = 20.0;
    config.save_to(&path)?;

    assert_eq!(PlaybackConfig::load_from(&path)?, config);
    Ok(())
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut config = PlaybackConfig::default();
    config.hygiene.interval_ms = 0;

    let result = PlaybackController::builder(
        Arc::new(SimulatedSink::new()),
        Arc::new(SimulatedFactory::new()),
    )
    .with_config(config)
    .with_scheduler(Arc::new(ManualClock::new()))
    .build();

    assert!(matches!(result, Err(PlaybackError::Config(_))));
}

#[test]
fn test_builder_without_runtime_needs_scheduler() {
    let result = PlaybackController::builder(
        Arc::new(SimulatedSink::new()),
        Arc::new(SimulatedFactory::new()),
    )
    .build();

    assert!(matches!(result, Err(PlaybackError::Internal(_))));
}

#[test]
fn test_config_is_exposed_on_controller() -> Result<()> {
    let mut config = PlaybackConfig::default();
    config.transport.seek_step_secs = 25.0;

    let controller = PlaybackController::builder(
        Arc::new(SimulatedSink::new()),
        Arc::new(SimulatedFactory::new()),
    )
    .with_config(config)
    .with_scheduler(Arc::new(ManualClock::new()))
    .build()?;

    assert_eq!(controller.config().transport.seek_step_secs, 25.0);
    assert_eq!(controller.status(), PlaybackStatus::Idle);
    Ok(())
}

#[test]
#[serial]
fn test_user_layer_keeps_system_values() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let system = dir.path().join("system.toml");
    let user = dir.path().join("user.toml");
    fs::write(
        &system,
        "[watchdog]\ninterval_ms = 5000\n\n[hygiene]\nkeep_behind_secs = 30.0\n",
    )?;
    fs::write(&user, "[recovery]\nmax_network_retries = 1\n")?;

    let config = PlaybackConfig::load_layered(&[&system, &user])?;
    assert_eq!(config.watchdog.interval_ms, 5_000);
    assert_eq!(config.hygiene.keep_behind_secs, 30.0);
    assert_eq!(config.recovery.max_network_retries, 1);
    assert_eq!(config.recovery.network_retry_delay_ms, 500);
    Ok(())
}
