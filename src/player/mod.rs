//! Playback controller module for tvplay
//!
//! This module owns the adaptive stream playback pipeline: the session
//! lifecycle, the error classifier and recovery policy, the stall watchdog,
//! buffer hygiene and autoplay negotiation. Collaborators (engine, sink,
//! timers) are injected, so every transition can be driven from tests.

mod autoplay;
mod controller;
mod hygiene;
pub(crate) mod mailbox;
mod recovery;
mod session;
mod watchdog;

pub use autoplay::{AutoplayNegotiator, StartOrigin, StartOutcome};
pub use controller::{PlaybackController, PlaybackControllerBuilder};
pub use hygiene::trim_point;
pub use recovery::{
    decide, ErrorCategory, ErrorEvent, FailureKind, RecoveryAction, RecoveryBudget,
    DECODE_FAILURE_MESSAGE, NETWORK_FAILURE_MESSAGE, PLAYBACK_FAILURE_MESSAGE,
};
pub use watchdog::{StallTracker, StallVerdict};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// No session, or a blank source
    Idle,

    /// Engine attached, waiting for the manifest or the first start
    Loading,

    /// Playback granted and progressing
    Playing,

    /// The watchdog found the playhead frozen with no read-ahead
    Stalled,

    /// An error is being recovered in place
    Recovering,

    /// The host refused programmatic playback; waiting for the user
    AwaitingGesture,

    /// Terminal for the session; a new attach is required
    Failed,
}

impl PlaybackStatus {
    /// Statuses in which the stall watchdog probes
    pub fn is_monitored(self) -> bool {
        matches!(self, PlaybackStatus::Playing | PlaybackStatus::Stalled)
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Stalled => "stalled",
            PlaybackStatus::Recovering => "recovering",
            PlaybackStatus::AwaitingGesture => "awaiting gesture",
            PlaybackStatus::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Notifications published by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// A new session was constructed
    SessionAttached { epoch: u64, url: String },

    /// A session and all its resources were released
    SessionTornDown { epoch: u64 },

    /// Status transition. Re-entering `Recovering` is reported as well.
    StatusChanged {
        epoch: u64,
        from: PlaybackStatus,
        to: PlaybackStatus,
    },

    /// A recovery step was started for an error
    RecoveryStarted {
        epoch: u64,
        category: ErrorCategory,
        fatal: bool,
        retry_count: u32,
    },

    /// The watchdog nudged a frozen playhead
    StallDetected { epoch: u64, position: f64 },

    /// Buffered media before `before` was released
    BufferTrimmed { epoch: u64, before: f64 },

    /// Show or hide the "press to start" affordance
    GesturePrompt { epoch: u64, visible: bool },

    /// The engine switched rendition
    QualityChanged { epoch: u64, level: usize },

    /// A user-visible failure message
    Failed {
        epoch: u64,
        kind: FailureKind,
        message: String,
    },
}

/// Player event handler trait
pub trait PlaybackEventHandler: Send + Sync {
    /// Handle a playback event
    fn handle_event(&mut self, event: PlaybackEvent);
}
