//! Configuration management for tvplay
//!
//! This module handles loading and managing the playback controller
//! configuration from config files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::utils::error::{IntoPlaybackError, PlaybackError, Result};

/// Main playback configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Stall watchdog settings
    pub watchdog: WatchdogConfig,

    /// Buffer hygiene settings
    pub hygiene: HygieneConfig,

    /// Error recovery settings
    pub recovery: RecoveryConfig,

    /// Remote transport settings
    pub transport: TransportConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Stall watchdog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Probe interval in milliseconds
    pub interval_ms: u64,

    /// Minimum position advance (seconds) that counts as progress
    pub progress_epsilon_secs: f64,

    /// How far to nudge the sink forward when a stall is detected
    pub nudge_secs: f64,

    /// Buffered seconds ahead of the playhead that count as healthy read-ahead
    pub min_read_ahead_secs: f64,
}

/// Buffer hygiene configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HygieneConfig {
    /// Trim interval in milliseconds
    pub interval_ms: u64,

    /// Playback position that must be reached before trimming starts
    pub min_position_secs: f64,

    /// Seconds of already-played media kept behind the playhead
    pub keep_behind_secs: f64,
}

/// Error recovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Retry budget for fatal network errors, per incident
    pub max_network_retries: u32,

    /// Delay before resuming after a non-fatal network error
    pub transient_resume_delay_ms: u64,

    /// Delay before reloading after a fatal network error
    pub network_retry_delay_ms: u64,

    /// Delay between a decode recovery and clearing the error state
    pub decode_recovery_delay_ms: u64,
}

/// Remote transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Seek step for fast-forward / rewind keys, in seconds
    pub seek_step_secs: f64,
}

/// General application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            progress_epsilon_secs: 0.1,
            nudge_secs: 0.1,
            min_read_ahead_secs: 2.0,
        }
    }
}

impl Default for HygieneConfig {
    fn default() -> Self {
        Self {
            interval_ms: 120_000,
            min_position_secs: 30.0,
            keep_behind_secs: 10.0,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_network_retries: 3,
            transient_resume_delay_ms: 300,
            network_retry_delay_ms: 500,
            decode_recovery_delay_ms: 1_000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { seek_step_secs: 10.0 }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl HygieneConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl RecoveryConfig {
    pub fn transient_resume_delay(&self) -> Duration {
        Duration::from_millis(self.transient_resume_delay_ms)
    }

    pub fn network_retry_delay(&self) -> Duration {
        Duration::from_millis(self.network_retry_delay_ms)
    }

    pub fn decode_recovery_delay(&self) -> Duration {
        Duration::from_millis(self.decode_recovery_delay_ms)
    }
}

impl PlaybackConfig {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/tvplay/config.toml on Linux)
    /// 3. User config file (~/.config/tvplay/config.toml on Linux)
    /// 4. Environment variables (TVPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let layers: Vec<PathBuf> = [Self::system_config_path(), Self::user_config_path()]
            .into_iter()
            .flatten()
            .filter(|path| path.exists())
            .collect();

        Self::load_layered(&layers)
    }

    /// Load configuration from one explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layered(&[path])
    }

    /// Merge config files key by key, later files winning, then apply
    /// environment overrides and validate
    pub fn load_layered<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths {
            merge_tables(&mut merged, Self::read_table(path.as_ref())?);
        }

        let mut config: Self = toml::Value::Table(merged).try_into()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlaybackError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self)
            .config_err("Failed to serialize config")?;

        std::fs::write(path, toml)
            .config_err("Failed to write config file")?;

        Ok(())
    }

    /// Parse one TOML layer; missing keys fall back to defaults after merging
    fn read_table(path: &Path) -> Result<toml::Table> {
        let contents = std::fs::read_to_string(path)
            .config_err("Failed to read config file")?;

        Ok(toml::from_str(&contents)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(interval) = std::env::var("TVPLAY_WATCHDOG_INTERVAL_MS") {
            self.watchdog.interval_ms = interval.parse::<u64>()
                .config_err("Invalid TVPLAY_WATCHDOG_INTERVAL_MS")?;
        }

        if let Ok(retries) = std::env::var("TVPLAY_MAX_NETWORK_RETRIES") {
            self.recovery.max_network_retries = retries.parse::<u32>()
                .config_err("Invalid TVPLAY_MAX_NETWORK_RETRIES")?;
        }

        if let Ok(step) = std::env::var("TVPLAY_SEEK_STEP_SECS") {
            self.transport.seek_step_secs = step.parse::<f64>()
                .config_err("Invalid TVPLAY_SEEK_STEP_SECS")?;
        }

        if let Ok(log_level) = std::env::var("TVPLAY_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.watchdog.interval_ms == 0 || self.hygiene.interval_ms == 0 {
            return Err(PlaybackError::Config("Timer intervals must be non-zero".to_string()));
        }

        let thresholds = [
            ("watchdog.progress_epsilon_secs", self.watchdog.progress_epsilon_secs),
            ("watchdog.nudge_secs", self.watchdog.nudge_secs),
            ("watchdog.min_read_ahead_secs", self.watchdog.min_read_ahead_secs),
            ("hygiene.min_position_secs", self.hygiene.min_position_secs),
            ("hygiene.keep_behind_secs", self.hygiene.keep_behind_secs),
            ("transport.seek_step_secs", self.transport.seek_step_secs),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(PlaybackError::Config(format!(
                    "{} must be a finite, non-negative number (got {})",
                    name, value
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlaybackError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/tvplay/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA").ok()
            .map(|p| PathBuf::from(p).join("tvplay").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/tvplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tvplay").join("config.toml"))
    }
}

/// Overlay `layer` onto `base`; nested tables merge, other values replace
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
