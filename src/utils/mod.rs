//! Utility module for tvplay
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - Common helper functions

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{
    GeneralConfig, HygieneConfig, PlaybackConfig, RecoveryConfig, TransportConfig, WatchdogConfig,
};
pub use error::{IntoPlaybackError, PlaybackError, Result};

/// Load the playback configuration from the standard locations
pub fn load_config() -> Result<PlaybackConfig> {
    PlaybackConfig::load()
}

/// Format a playback position for display
///
/// Returns "HH:MM:SS" or "MM:SS" for positions under an hour. Non-finite
/// positions (live edge) render as "LIVE".
pub fn format_position(secs: f64) -> String {
    if !secs.is_finite() {
        return "LIVE".to_string();
    }

    let total_secs = secs.max(0.0) as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Clamp a seek target into `[0, duration]`
///
/// Unknown or unbounded durations (NaN, infinity, live streams) only clamp
/// the lower bound.
pub fn clamp_position(target: f64, duration: f64) -> f64 {
    let target = if target.is_nan() { 0.0 } else { target.max(0.0) };
    if duration.is_finite() && duration >= 0.0 {
        target.min(duration)
    } else {
        target
    }
}
