//! Adaptive bitrate engine contract
//!
//! The engine is an embedded segmented-streaming client: given a manifest
//! URL it fetches segments, feeds the sink and reports lifecycle and error
//! events. Bitrate selection, DRM and manifest parsing live behind this
//! trait and are not the controller's concern.

use crate::media::MediaSink;
use crate::player::mailbox::{Input, Port};
use crate::player::ErrorEvent;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Raw error families reported by engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Manifest or segment fetch failures
    Network,

    /// Buffer append or decode failures
    Media,

    /// Demuxing / remuxing failures
    Mux,

    /// License or key-system failures
    KeySystem,

    /// Anything the engine could not classify
    Other,
}

/// Lifecycle and error events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    /// Manifest parsed; playback can be requested
    ManifestReady,

    /// A segment was appended to the sink's buffer
    SegmentBuffered,

    /// The engine switched rendition
    QualityChanged { level: usize },

    Error(ErrorEvent),
}

/// One engine instance, owned by exactly one session
pub trait StreamEngine: Send {
    fn attach_to_sink(&mut self, sink: Arc<dyn MediaSink>) -> Result<()>;

    fn detach_from_sink(&mut self);

    /// Start loading the manifest at `url`
    fn load(&mut self, url: &str) -> Result<()>;

    /// Resume segment loading after a pause or a transient failure
    fn resume_loading(&mut self) -> Result<()>;

    /// Stop all network activity without releasing the instance
    fn stop_loading(&mut self);

    /// Run the engine's built-in media error recovery
    fn recover_from_decode_error(&mut self) -> Result<()>;

    /// Evict buffered media that ends before `position` (seconds)
    fn release_buffer_before(&mut self, position: f64) -> Result<()>;

    /// Release every resource held by the instance
    fn destroy(&mut self);
}

/// Creates engine instances for new sessions
pub trait EngineFactory: Send + Sync {
    /// Whether the platform supports segmented streaming at all
    fn is_supported(&self) -> bool {
        true
    }

    /// Build an engine that reports through `events`
    fn create(&self, events: EngineEvents) -> Result<Box<dyn StreamEngine>>;
}

/// Event emitter handed to an engine for one session
///
/// Events emitted after the session was superseded are dropped by the
/// controller.
#[derive(Clone)]
pub struct EngineEvents {
    port: Port,
}

impl EngineEvents {
    pub(crate) fn new(port: Port) -> Self {
        Self { port }
    }

    /// Epoch of the session this emitter belongs to
    pub fn epoch(&self) -> u64 {
        self.port.epoch()
    }

    pub fn emit(&self, event: EngineEvent) {
        self.port.post(Input::Engine {
            epoch: self.port.epoch(),
            event,
        });
    }

    /// Shorthand for reporting a raw engine error
    pub fn error(&self, kind: EngineErrorKind, fatal: bool, detail: impl Into<String>) {
        self.emit(EngineEvent::Error(ErrorEvent::from_engine(kind, fatal, detail)));
    }
}

impl fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEvents").field("epoch", &self.epoch()).finish()
    }
}
