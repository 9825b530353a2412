//! Media sink contract
//!
//! The sink is the platform's native video element: it renders what the
//! engine feeds it and reports playback state. The controller talks to it
//! only through [`MediaSink`]; events flow back through an epoch-bound
//! [`SinkEvents`] listener installed for the lifetime of one session.

use crate::player::mailbox::{Input, Port};
use crate::player::{StartOrigin, StartOutcome};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Readiness of the sink, mirroring the HTML media element levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    /// Nothing known about the media
    HaveNothing,

    /// Duration and dimensions known
    HaveMetadata,

    /// Data for the current position only
    HaveCurrentData,

    /// Data for the current position and a little beyond
    HaveFutureData,

    /// Enough data to play through at the current rate
    HaveEnoughData,
}

impl ReadyState {
    /// Whether enough data is buffered ahead of the playhead to resume cleanly
    pub fn has_read_ahead(self) -> bool {
        self >= ReadyState::HaveFutureData
    }

    /// Map the numeric readyState reported by web-based hosts
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }
}

/// A buffered interval in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}

/// Seconds of media buffered contiguously ahead of `position`
pub fn buffered_ahead(ranges: &[TimeRange], position: f64) -> f64 {
    ranges
        .iter()
        .find(|r| r.contains(position))
        .map(|r| r.end - position)
        .unwrap_or(0.0)
}

/// Error codes reported by the sink itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkErrorKind {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SinkErrorKind::Aborted => "fetch aborted",
            SinkErrorKind::Network => "network error",
            SinkErrorKind::Decode => "decode error",
            SinkErrorKind::SourceNotSupported => "source not supported",
        };
        f.write_str(text)
    }
}

/// Events emitted by the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkEvent {
    Waiting,
    Stalled,
    Playing,
    CanPlay,
    Progress,
    Error(SinkErrorKind),
}

/// The platform's native media-rendering primitive
pub trait MediaSink: Send + Sync {
    /// Request playback. The host resolves `reply` once it accepts or refuses.
    fn play(&self, reply: StartReply);

    fn pause(&self);

    /// Move the playhead, in seconds
    fn seek(&self, position: f64) -> Result<()>;

    /// Current playhead position in seconds
    fn position(&self) -> f64;

    /// Media duration in seconds; infinite or NaN when unknown (live)
    fn duration(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn buffered_ranges(&self) -> Vec<TimeRange>;

    /// Whether the sink can play `url` itself, without a streaming engine
    fn can_play_natively(&self, url: &str) -> bool;

    /// Point the sink directly at `url` for native playback
    fn set_source(&self, url: &str) -> Result<()>;

    /// Drop the current source and every buffered byte
    fn release_source(&self);

    /// Install or clear the event listener for the live session
    fn set_listener(&self, listener: Option<SinkEvents>);
}

/// Event listener handed to the sink for one session
#[derive(Clone)]
pub struct SinkEvents {
    port: Port,
}

impl SinkEvents {
    pub(crate) fn new(port: Port) -> Self {
        Self { port }
    }

    /// Epoch of the session this listener belongs to
    pub fn epoch(&self) -> u64 {
        self.port.epoch()
    }

    pub fn emit(&self, event: SinkEvent) {
        self.port.post(Input::Sink {
            epoch: self.port.epoch(),
            event,
        });
    }
}

impl fmt::Debug for SinkEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkEvents").field("epoch", &self.epoch()).finish()
    }
}

/// Pending answer to a play request
///
/// Resolving consumes the reply, so each request is answered at most once.
/// A reply dropped without an answer leaves the controller waiting for the
/// sink's own `Playing` event.
pub struct StartReply {
    port: Port,
    origin: StartOrigin,
}

impl StartReply {
    pub(crate) fn new(port: Port, origin: StartOrigin) -> Self {
        Self { port, origin }
    }

    /// Why playback was requested
    pub fn origin(&self) -> StartOrigin {
        self.origin
    }

    pub fn epoch(&self) -> u64 {
        self.port.epoch()
    }

    /// The host started playback
    pub fn grant(self) {
        self.resolve(StartOutcome::Granted);
    }

    /// The host refused programmatic playback
    pub fn reject(self, reason: impl Into<String>) {
        self.resolve(StartOutcome::Rejected(reason.into()));
    }

    fn resolve(self, outcome: StartOutcome) {
        self.port.post(Input::StartOutcome {
            epoch: self.port.epoch(),
            origin: self.origin,
            outcome,
        });
    }
}

impl fmt::Debug for StartReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartReply")
            .field("epoch", &self.epoch())
            .field("origin", &self.origin)
            .finish()
    }
}
