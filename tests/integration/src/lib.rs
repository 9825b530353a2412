//! Integration test utilities for tvplay
//!
//! This module provides the shared fixture for integration testing:
//! - A controller wired to simulated engine and sink collaborators
//! - A virtual clock so timer-driven behaviour runs instantly
//! - Helpers for inspecting the published event log

use anyhow::Result;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tvplay::player::{ErrorEvent, PlaybackController, PlaybackEvent, PlaybackStatus};
use tvplay::sim::{SimulatedFactory, SimulatedSink};
use tvplay::timer::ManualClock;
use tvplay::utils::PlaybackConfig;
use tvplay::{EngineEvent, ReadyState};

pub const STREAM_A: &str = "https://cdn.example/live/stream-A.m3u8";
pub const STREAM_B: &str = "https://cdn.example/live/stream-B.m3u8";
pub const STREAM_C: &str = "https://cdn.example/live/stream-C.m3u8";

/// Controller plus simulated collaborators on a virtual clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub sink: Arc<SimulatedSink>,
    pub factory: Arc<SimulatedFactory>,
    pub controller: PlaybackController,
    events: Receiver<PlaybackEvent>,
}

impl Harness {
    /// Create a harness with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(PlaybackConfig::default())
    }

    pub fn with_config(config: PlaybackConfig) -> Result<Self> {
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(SimulatedSink::new());
        let factory = Arc::new(SimulatedFactory::new());

        let controller = PlaybackController::builder(sink.clone(), factory.clone())
            .with_config(config)
            .with_scheduler(clock.clone())
            .build()?;
        let events = controller.subscribe_events();

        Ok(Self {
            clock,
            sink,
            factory,
            controller,
            events,
        })
    }

    /// Advance virtual time, firing due timers
    pub fn advance_ms(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    /// Events published since the last call
    pub fn take_events(&self) -> Vec<PlaybackEvent> {
        self.events.try_iter().collect()
    }

    /// Attach `url` and let the manifest arrive; the host grants autoplay
    /// unless the sink's play policy says otherwise.
    pub fn start_playing(&self, url: &str) {
        self.controller.attach(url);
        self.sink.set_ready_state(ReadyState::HaveEnoughData);
        self.factory.emit(EngineEvent::ManifestReady);
    }

    pub fn network_error(&self, fatal: bool) {
        self.factory
            .emit(EngineEvent::Error(ErrorEvent::network(fatal, "segment request timed out")));
    }

    pub fn decode_error(&self, fatal: bool) {
        self.factory
            .emit(EngineEvent::Error(ErrorEvent::decode(fatal, "bufferAppendError")));
    }

    pub fn segment_buffered(&self) {
        self.factory.emit(EngineEvent::SegmentBuffered);
    }
}

/// Target statuses of every `StatusChanged` event, in order
pub fn status_trail(events: &[PlaybackEvent]) -> Vec<PlaybackStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::StatusChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

/// Number of `RecoveryStarted` events
pub fn recoveries(events: &[PlaybackEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, PlaybackEvent::RecoveryStarted { .. }))
        .count()
}
