//! Remote transport adapter
//!
//! Translates hardware remote keys into transport operations on the live
//! session. The adapter keeps no state of its own; the controller decides
//! whether a session is there to receive the command.

use crate::player::PlaybackController;
use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport keys found on TV remotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKey {
    Play,
    Pause,
    TogglePlayPause,
    Stop,
    FastForward,
    Rewind,
}

/// Fixed key table: (platform key code, key name, key)
const KEY_TABLE: [(u32, &str, RemoteKey); 6] = [
    (415, "MediaPlay", RemoteKey::Play),
    (19, "MediaPause", RemoteKey::Pause),
    (10252, "MediaPlayPause", RemoteKey::TogglePlayPause),
    (413, "MediaStop", RemoteKey::Stop),
    (417, "MediaFastForward", RemoteKey::FastForward),
    (412, "MediaRewind", RemoteKey::Rewind),
];

static KEYS_BY_CODE: Lazy<HashMap<u32, RemoteKey>> =
    Lazy::new(|| KEY_TABLE.iter().map(|&(code, _, key)| (code, key)).collect());

static KEYS_BY_NAME: Lazy<HashMap<&'static str, RemoteKey>> =
    Lazy::new(|| KEY_TABLE.iter().map(|&(_, name, key)| (name, key)).collect());

impl RemoteKey {
    /// Look up a raw platform key code
    pub fn from_key_code(code: u32) -> Option<Self> {
        KEYS_BY_CODE.get(&code).copied()
    }

    /// Look up a DOM-style key name, e.g. `MediaPlayPause`
    pub fn from_key_name(name: &str) -> Option<Self> {
        KEYS_BY_NAME.get(name).copied()
    }

    pub fn key_name(self) -> &'static str {
        KEY_TABLE
            .iter()
            .find(|&&(_, _, key)| key == self)
            .map(|&(_, name, _)| name)
            .unwrap_or("Unidentified")
    }
}

/// Something that accepts transport operations
///
/// Implemented by [`PlaybackController`]; tests substitute a mock.
pub trait Transport {
    fn play(&self);
    fn pause(&self);
    fn toggle_play_pause(&self);
    fn seek_by(&self, delta_secs: f64);
    fn reset_position(&self);
}

impl Transport for PlaybackController {
    fn play(&self) {
        PlaybackController::play(self)
    }

    fn pause(&self) {
        PlaybackController::pause(self)
    }

    fn toggle_play_pause(&self) {
        PlaybackController::toggle_play_pause(self)
    }

    fn seek_by(&self, delta_secs: f64) {
        PlaybackController::seek_by(self, delta_secs)
    }

    fn reset_position(&self) {
        PlaybackController::reset_position(self)
    }
}

/// Maps remote keys onto a [`Transport`]
pub struct RemoteTransport<T: Transport> {
    transport: T,
    seek_step_secs: f64,
}

impl RemoteTransport<PlaybackController> {
    /// Adapter for a controller, using its configured seek step
    pub fn for_controller(controller: PlaybackController) -> Self {
        let step = controller.config().transport.seek_step_secs;
        Self::new(controller, step)
    }
}

impl<T: Transport> RemoteTransport<T> {
    pub fn new(transport: T, seek_step_secs: f64) -> Self {
        Self {
            transport,
            seek_step_secs,
        }
    }

    pub fn handle_key(&self, key: RemoteKey) {
        debug!("Remote key {:?}", key);
        match key {
            RemoteKey::Play => self.transport.play(),
            RemoteKey::Pause => self.transport.pause(),
            RemoteKey::TogglePlayPause => self.transport.toggle_play_pause(),
            RemoteKey::Stop => self.transport.reset_position(),
            RemoteKey::FastForward => self.transport.seek_by(self.seek_step_secs),
            RemoteKey::Rewind => self.transport.seek_by(-self.seek_step_secs),
        }
    }

    /// Handle a raw key code; returns false for keys outside the table
    pub fn handle_key_code(&self, code: u32) -> bool {
        match RemoteKey::from_key_code(code) {
            Some(key) => {
                self.handle_key(key);
                true
            }
            None => false,
        }
    }

    /// Handle a key name; returns false for keys outside the table
    pub fn handle_key_name(&self, name: &str) -> bool {
        match RemoteKey::from_key_name(name) {
            Some(key) => {
                self.handle_key(key);
                true
            }
            None => false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
