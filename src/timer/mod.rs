//! Cancellable timers for the playback controller
//!
//! The controller never sleeps or spawns directly. Every periodic probe and
//! every delayed recovery step goes through a [`Scheduler`], so the same
//! controller runs on a tokio runtime in production and on a virtual clock
//! in tests.

mod manual;
mod tokio_scheduler;

pub use manual::ManualClock;
pub use tokio_scheduler::TokioScheduler;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Work executed when a timer fires
pub type TimerTask = Box<dyn FnMut() + Send + 'static>;

/// Source of time and timers
pub trait Scheduler: Send + Sync {
    /// Monotonic time since the scheduler was created
    fn now(&self) -> Duration;

    /// Run `task` once after `delay`
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Run `task` every `period`, first firing one period from now
    fn schedule_repeating(&self, period: Duration, task: TimerTask) -> TimerHandle;
}

/// Handle to a scheduled timer
///
/// Cloning the handle shares the same timer. Cancelling is idempotent and
/// takes effect immediately: a cancelled timer never runs its task again.
#[derive(Clone, Debug, Default)]
pub struct TimerHandle {
    slot: Arc<TimerSlot>,
}

#[derive(Debug, Default)]
struct TimerSlot {
    cancelled: AtomicBool,
    finished: AtomicBool,
    abort: Mutex<Option<tokio::task::AbortHandle>>,
}

impl TimerHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stop the timer. Safe to call any number of times.
    pub fn cancel(&self) {
        self.slot.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = self.slot.abort.lock().take() {
            abort.abort();
        }
    }

    /// Whether the timer can still fire
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.slot.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::SeqCst)
    }

    /// One-shot timers mark themselves finished right before running
    pub(crate) fn mark_finished(&self) {
        self.slot.finished.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_abort(&self, abort: tokio::task::AbortHandle) {
        let mut slot = self.slot.abort.lock();
        if self.is_cancelled() {
            abort.abort();
        } else {
            *slot = Some(abort);
        }
    }
}
