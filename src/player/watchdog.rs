//! Stall detection
//!
//! The watchdog compares the playhead against the previous probe. Playback
//! counts as stalled only when the playhead has not advanced by more than
//! the configured epsilon *and* the sink lacks read-ahead data, judged from
//! its ready state and the buffered range under the playhead. A frozen
//! playhead with a healthy buffer is left to the sink.

use crate::media::ReadyState;
use crate::utils::config::WatchdogConfig;
use std::time::Duration;

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StallVerdict {
    /// The user paused; not a stall
    Paused,

    /// The playhead advanced since the last probe
    Progressing { delta: f64 },

    /// Not advancing, but enough data is buffered to resume on its own
    Holding,

    /// Not advancing and starved of data
    Stalled,
}

/// Position bookkeeping between probes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StallTracker {
    pub last_observed_position: f64,
    pub last_observed_at: Duration,
    pub stalled_since: Option<Duration>,
}

impl StallTracker {
    pub fn observe(&mut self, position: f64, now: Duration) {
        self.last_observed_position = position;
        self.last_observed_at = now;
    }

    /// Evaluate the current probe against the previous one
    pub fn assess(
        &self,
        position: f64,
        paused: bool,
        ready_state: ReadyState,
        buffered_ahead: f64,
        config: &WatchdogConfig,
    ) -> StallVerdict {
        if paused {
            return StallVerdict::Paused;
        }

        let delta = position - self.last_observed_position;
        if delta >= config.progress_epsilon_secs {
            StallVerdict::Progressing { delta }
        } else if ready_state.has_read_ahead() || buffered_ahead >= config.min_read_ahead_secs {
            StallVerdict::Holding
        } else {
            StallVerdict::Stalled
        }
    }

    /// Record the verdict; returns how long playback has been stalled
    pub fn record(&mut self, verdict: StallVerdict, now: Duration) -> Option<Duration> {
        match verdict {
            StallVerdict::Stalled => {
                let since = *self.stalled_since.get_or_insert(now);
                Some(now.saturating_sub(since))
            }
            _ => {
                self.stalled_since = None;
                None
            }
        }
    }
}
