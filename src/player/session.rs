//! Playback session state
//!
//! A session is one attachment of a source URL, identified by its epoch.
//! It owns the engine instance and every timer started on its behalf.

use crate::engine::StreamEngine;
use crate::player::autoplay::AutoplayNegotiator;
use crate::player::recovery::RecoveryBudget;
use crate::player::watchdog::StallTracker;
use crate::timer::TimerHandle;

pub(crate) struct Session {
    pub epoch: u64,
    pub source_url: String,
    pub engine: Option<Box<dyn StreamEngine>>,
    /// The sink plays the source itself; no engine is involved
    pub native: bool,
    pub budget: RecoveryBudget,
    pub autoplay: AutoplayNegotiator,
    pub stall: StallTracker,
    timers: Vec<TimerHandle>,
}

impl Session {
    pub fn new(epoch: u64, source_url: &str) -> Self {
        Self {
            epoch,
            source_url: source_url.to_string(),
            engine: None,
            native: false,
            budget: RecoveryBudget::default(),
            autoplay: AutoplayNegotiator::default(),
            stall: StallTracker::default(),
            timers: Vec::new(),
        }
    }

    /// Take ownership of a timer so teardown can cancel it
    pub fn track_timer(&mut self, timer: TimerHandle) {
        self.timers.retain(TimerHandle::is_active);
        self.timers.push(timer);
    }

    /// Cancel every timer owned by this session
    pub fn cancel_timers(&mut self) -> usize {
        let active = self.timers.iter().filter(|t| t.is_active()).count();
        for timer in self.timers.drain(..) {
            timer.cancel();
        }
        active
    }

    pub fn active_timers(&self) -> usize {
        self.timers.iter().filter(|t| t.is_active()).count()
    }

    /// Detach and destroy the engine, if one is still held
    pub fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.detach_from_sink();
            engine.destroy();
        }
    }
}
