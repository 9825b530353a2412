//! Buffer hygiene
//!
//! Long unattended sessions keep appending segments; periodically evicting
//! media well behind the playhead bounds memory without touching playback.

use crate::utils::config::HygieneConfig;

/// Position before which buffered media may be released, if any
pub fn trim_point(position: f64, config: &HygieneConfig) -> Option<f64> {
    if position.is_finite() && position > config.min_position_secs {
        Some((position - config.keep_behind_secs).max(0.0))
    } else {
        None
    }
}
