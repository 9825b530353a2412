//! Virtual-time scheduler
//!
//! Time only moves when [`ManualClock::advance`] is called. Timers fire in
//! due order (ties in scheduling order) and their tasks run with the clock
//! unlocked, so a task may schedule or cancel other timers.

use super::{Scheduler, TimerHandle, TimerTask};
use log::trace;
use parking_lot::Mutex;
use std::time::Duration;

/// Smallest period a repeating timer may have
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Deterministic clock for tests and offline scenario replay
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ClockState>,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_seq: u64,
    entries: Vec<Entry>,
}

struct Entry {
    due: Duration,
    seq: u64,
    period: Option<Duration>,
    handle: TimerHandle,
    task: TimerTask,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward, firing every timer that falls due
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            let mut entry = {
                let mut state = self.state.lock();
                state.entries.retain(|e| !e.handle.is_cancelled());

                let next = state
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due <= target)
                    .min_by_key(|(_, e)| (e.due, e.seq))
                    .map(|(idx, _)| idx);

                match next {
                    Some(idx) => {
                        let entry = state.entries.swap_remove(idx);
                        state.now = entry.due;
                        entry
                    }
                    None => {
                        state.now = target;
                        return;
                    }
                }
            };

            if entry.period.is_none() {
                entry.handle.mark_finished();
            }

            trace!("Virtual timer fired at {:?}", entry.due);
            (entry.task)();

            if let Some(period) = entry.period {
                if !entry.handle.is_cancelled() {
                    let mut state = self.state.lock();
                    entry.due += period;
                    entry.seq = state.next_seq;
                    state.next_seq += 1;
                    state.entries.push(entry);
                }
            }
        }
    }

    /// Number of timers that can still fire
    pub fn pending_timers(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.handle.is_active())
            .count()
    }

    fn insert(&self, delay: Duration, period: Option<Duration>, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        let entry = Entry {
            due: state.now + delay,
            seq: state.next_seq,
            period,
            handle: handle.clone(),
            task,
        };
        state.next_seq += 1;
        state.entries.push(entry);
        handle
    }
}

impl Scheduler for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        self.insert(delay, None, task)
    }

    fn schedule_repeating(&self, period: Duration, task: TimerTask) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        self.insert(period, Some(period), task)
    }
}
