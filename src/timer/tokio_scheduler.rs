//! Tokio-backed scheduler
//!
//! Each timer is a spawned task; cancelling the handle aborts it.

use super::{Scheduler, TimerHandle, TimerTask};
use crate::utils::error::Result;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};

/// Scheduler running timers on a tokio runtime
pub struct TokioScheduler {
    handle: Handle,
    origin: Instant,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            origin: Instant::now(),
        }
    }

    /// Bind to the runtime of the calling context
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| crate::internal_error!("No tokio runtime available: {}", e))?;
        Ok(Self::new(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        Instant::now().duration_since(self.origin)
    }

    fn schedule_once(&self, delay: Duration, mut task: TimerTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let guard = timer.clone();

        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !guard.is_cancelled() {
                guard.mark_finished();
                task();
            }
        });

        timer.set_abort(join.abort_handle());
        timer
    }

    fn schedule_repeating(&self, period: Duration, mut task: TimerTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let guard = timer.clone();

        let join = self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if guard.is_cancelled() {
                    break;
                }
                task();
            }
        });

        timer.set_abort(join.abort_handle());
        timer
    }
}
