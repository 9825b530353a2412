//! tvplay - adaptive stream playback controller for smart-TV applications
//!
//! The controller drives an embedded segmented-streaming engine and the
//! platform's video element through one session at a time. It recovers from
//! network and decode faults, nudges stalled playback, trims played-out
//! buffer, negotiates autoplay with the host and maps remote keys onto
//! transport operations.

pub mod engine;
pub mod media;
pub mod player;
pub mod remote;
pub mod sim;
pub mod timer;
pub mod utils;

pub use engine::{EngineErrorKind, EngineEvent, EngineEvents, EngineFactory, StreamEngine};
pub use media::{MediaSink, ReadyState, SinkErrorKind, SinkEvent, SinkEvents, StartReply, TimeRange};
pub use player::{
    ErrorCategory, ErrorEvent, FailureKind, PlaybackController, PlaybackControllerBuilder,
    PlaybackEvent, PlaybackEventHandler, PlaybackStatus, StartOrigin, StartOutcome,
};
pub use remote::{RemoteKey, RemoteTransport, Transport};
pub use timer::{ManualClock, Scheduler, TimerHandle, TokioScheduler};
pub use utils::{PlaybackConfig, PlaybackError, Result};
