//! Autoplay negotiation
//!
//! Hosts may refuse programmatic playback. After a refusal the negotiator
//! waits for an explicit user gesture and allows exactly one retry per
//! refusal; it never retries silently.

use serde::{Deserialize, Serialize};

/// Why playback was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOrigin {
    /// Automatic start after the manifest became ready
    Autoplay,

    /// Retry triggered by a user gesture
    Gesture,

    /// Resume issued by recovery, the watchdog or a transport key
    Resume,
}

/// Host answer to a play request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Granted,
    Rejected(String),
}

/// Per-session autoplay state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoplayNegotiator {
    granted: bool,
    awaiting_gesture: bool,
    gesture_armed: bool,
    rejections: u32,
}

impl AutoplayNegotiator {
    /// Playback has been granted at least once and not refused since
    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// The "press to start" affordance should be visible
    pub fn is_awaiting_gesture(&self) -> bool {
        self.awaiting_gesture
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    /// Returns true when the gesture prompt was visible and is now cleared
    pub fn on_granted(&mut self) -> bool {
        self.granted = true;
        self.gesture_armed = false;
        std::mem::replace(&mut self.awaiting_gesture, false)
    }

    /// Arms exactly one gesture retry
    pub fn on_rejected(&mut self) {
        self.granted = false;
        self.awaiting_gesture = true;
        self.gesture_armed = true;
        self.rejections += 1;
    }

    /// Consume the armed retry; false if none is available
    pub fn take_gesture(&mut self) -> bool {
        if self.awaiting_gesture && self.gesture_armed {
            self.gesture_armed = false;
            true
        } else {
            false
        }
    }
}
