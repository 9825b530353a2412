//! Input serialisation for the controller
//!
//! Every input (caller request, collaborator event, timer fire, start
//! outcome) is queued here and processed one at a time by whichever thread
//! finds the mailbox idle. Inputs raised while an input is being processed,
//! including re-entrant ones from inside a collaborator call, are appended
//! and handled afterwards in order.

use crate::engine::EngineEvent;
use crate::media::SinkEvent;
use crate::player::{StartOrigin, StartOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Weak;

/// Timer-driven inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    StallCheck,
    BufferTrim,
    ResumeLoading,
    ReloadSource,
    DecodeSettled,
}

/// Transport operations on the live session's sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TransportCommand {
    Play,
    Pause,
    TogglePlayPause,
    SeekBy(f64),
    ResetPosition,
}

#[derive(Debug)]
pub(crate) enum Input {
    Attach { epoch: u64, url: String },
    Teardown,
    Engine { epoch: u64, event: EngineEvent },
    Sink { epoch: u64, event: SinkEvent },
    StartOutcome { epoch: u64, origin: StartOrigin, outcome: StartOutcome },
    Timer { epoch: u64, kind: TimerKind },
    Gesture,
    Transport(TransportCommand),
}

/// Receiver of inputs
pub(crate) trait InputTarget: Send + Sync {
    fn post(&self, input: Input);
}

/// Epoch-stamped, non-owning route back to the controller
#[derive(Clone)]
pub(crate) struct Port {
    epoch: u64,
    target: Weak<dyn InputTarget>,
}

impl Port {
    pub(crate) fn new(epoch: u64, target: Weak<dyn InputTarget>) -> Self {
        Self { epoch, target }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Deliver `input`; silently dropped once the controller is gone
    pub(crate) fn post(&self, input: Input) {
        if let Some(target) = self.target.upgrade() {
            target.post(input);
        }
    }
}

#[derive(Default)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
}

#[derive(Default)]
struct MailboxState {
    queue: VecDeque<Input>,
    draining: bool,
}

impl Mailbox {
    /// Queue an input. Returns true when the caller became the drainer and
    /// must call [`Mailbox::next`] until it returns `None`.
    pub(crate) fn push(&self, input: Input) -> bool {
        let mut state = self.state.lock();
        state.queue.push_back(input);
        if state.draining {
            false
        } else {
            state.draining = true;
            true
        }
    }

    /// Process queued inputs until the queue is empty. The drainer role is
    /// released even if `process` panics, so later pushes drain again.
    pub(crate) fn drain(&self, mut process: impl FnMut(Input)) {
        let mut guard = DrainGuard {
            mailbox: self,
            finished: false,
        };
        while let Some(input) = self.next() {
            process(input);
        }
        guard.finished = true;
    }

    /// Next input to process; `None` releases the drainer role
    pub(crate) fn next(&self) -> Option<Input> {
        let mut state = self.state.lock();
        let input = state.queue.pop_front();
        if input.is_none() {
            state.draining = false;
        }
        input
    }
}

struct DrainGuard<'a> {
    mailbox: &'a Mailbox,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        // `next` already released the role on a normal exit
        if !self.finished {
            self.mailbox.state.lock().draining = false;
        }
    }
}
