//! Simulated collaborators
//!
//! An in-memory engine and sink that record every call made on them and
//! let a driver inject events, state and failures. The CLI replays fault
//! scenarios against them, and the tests use them as fakes.

mod scenario;

pub use scenario::{Scenario, ScenarioAction, ScenarioRig, ScenarioStep};

use crate::engine::{EngineEvent, EngineEvents, EngineFactory, StreamEngine};
use crate::media::{MediaSink, ReadyState, SinkEvent, SinkEvents, StartReply, TimeRange};
use crate::player::StartOrigin;
use crate::utils::clamp_position;
use crate::utils::error::{PlaybackError, Result};
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Engine operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOp {
    Create,
    Attach,
    Load,
    ResumeLoading,
    RecoverDecode,
    ReleaseBuffer,
}

/// A call received by a simulated engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    AttachToSink,
    DetachFromSink,
    Load(String),
    ResumeLoading,
    StopLoading,
    RecoverFromDecodeError,
    ReleaseBufferBefore(f64),
    Destroy,
}

struct EngineRecord {
    events: EngineEvents,
    calls: Vec<EngineCall>,
    destroyed: bool,
}

#[derive(Default)]
struct FactoryState {
    unsupported: bool,
    auto_manifest: bool,
    failures: HashMap<EngineOp, u32>,
    engines: Vec<EngineRecord>,
}

impl FactoryState {
    /// Consume one injected failure for `op`
    fn take_failure(&mut self, op: EngineOp) -> bool {
        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Factory producing [`SimulatedEngine`]s that share one call log
#[derive(Default)]
pub struct SimulatedFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl SimulatedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the platform lacks segmented-streaming support
    pub fn set_supported(&self, supported: bool) {
        self.state.lock().unsupported = !supported;
    }

    /// Emit `ManifestReady` from inside every successful `load`
    pub fn set_auto_manifest(&self, enabled: bool) {
        self.state.lock().auto_manifest = enabled;
    }

    /// Make the next `count` calls of `op` fail
    pub fn fail_next(&self, op: EngineOp, count: u32) {
        self.state.lock().failures.insert(op, count);
    }

    /// Engines created so far
    pub fn instances(&self) -> usize {
        self.state.lock().engines.len()
    }

    /// Engines created and not yet destroyed
    pub fn live_instances(&self) -> usize {
        self.state.lock().engines.iter().filter(|e| !e.destroyed).count()
    }

    /// Calls received by engine `id` (1-based creation order)
    pub fn calls(&self, id: usize) -> Vec<EngineCall> {
        self.state
            .lock()
            .engines
            .get(id.wrapping_sub(1))
            .map(|e| e.calls.clone())
            .unwrap_or_default()
    }

    pub fn is_destroyed(&self, id: usize) -> bool {
        self.state
            .lock()
            .engines
            .get(id.wrapping_sub(1))
            .is_some_and(|e| e.destroyed)
    }

    /// Emitter of engine `id`, kept even after the engine is destroyed
    pub fn events(&self, id: usize) -> Option<EngineEvents> {
        self.state
            .lock()
            .engines
            .get(id.wrapping_sub(1))
            .map(|e| e.events.clone())
    }

    /// Emitter of the most recently created engine
    pub fn latest_events(&self) -> Option<EngineEvents> {
        self.state.lock().engines.last().map(|e| e.events.clone())
    }

    /// Emit from the latest engine; false when no engine was ever created
    pub fn emit(&self, event: EngineEvent) -> bool {
        // the lock must be released before the controller processes the event
        let events = self.latest_events();
        match events {
            Some(events) => {
                events.emit(event);
                true
            }
            None => false,
        }
    }

    /// Emit from engine `id`, whether or not its session is still live
    pub fn emit_from(&self, id: usize, event: EngineEvent) -> bool {
        let events = self.events(id);
        match events {
            Some(events) => {
                events.emit(event);
                true
            }
            None => false,
        }
    }
}

impl EngineFactory for SimulatedFactory {
    fn is_supported(&self) -> bool {
        !self.state.lock().unsupported
    }

    fn create(&self, events: EngineEvents) -> Result<Box<dyn StreamEngine>> {
        let mut state = self.state.lock();
        if state.take_failure(EngineOp::Create) {
            return Err(PlaybackError::engine_error("simulated engine construction failure"));
        }

        state.engines.push(EngineRecord {
            events,
            calls: Vec::new(),
            destroyed: false,
        });
        let id = state.engines.len();
        debug!("Simulated engine #{} created", id);

        Ok(Box::new(SimulatedEngine {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Engine instance handed to the controller
pub struct SimulatedEngine {
    id: usize,
    state: Arc<Mutex<FactoryState>>,
}

impl SimulatedEngine {
    fn record(&self, call: EngineCall, op: Option<EngineOp>) -> Result<()> {
        let mut state = self.state.lock();
        trace!("Simulated engine #{}: {:?}", self.id, call);
        let failed = op.is_some_and(|op| state.take_failure(op));
        if let Some(record) = state.engines.get_mut(self.id - 1) {
            record.calls.push(call.clone());
        }
        if failed {
            return Err(PlaybackError::engine_error(format!("simulated failure of {:?}", call)));
        }
        Ok(())
    }
}

impl StreamEngine for SimulatedEngine {
    fn attach_to_sink(&mut self, _sink: Arc<dyn MediaSink>) -> Result<()> {
        self.record(EngineCall::AttachToSink, Some(EngineOp::Attach))
    }

    fn detach_from_sink(&mut self) {
        let _ = self.record(EngineCall::DetachFromSink, None);
    }

    fn load(&mut self, url: &str) -> Result<()> {
        self.record(EngineCall::Load(url.to_string()), Some(EngineOp::Load))?;

        let auto_manifest = {
            let state = self.state.lock();
            state
                .auto_manifest
                .then(|| state.engines.get(self.id - 1).map(|e| e.events.clone()))
                .flatten()
        };
        if let Some(events) = auto_manifest {
            events.emit(EngineEvent::ManifestReady);
        }
        Ok(())
    }

    fn resume_loading(&mut self) -> Result<()> {
        self.record(EngineCall::ResumeLoading, Some(EngineOp::ResumeLoading))
    }

    fn stop_loading(&mut self) {
        let _ = self.record(EngineCall::StopLoading, None);
    }

    fn recover_from_decode_error(&mut self) -> Result<()> {
        self.record(EngineCall::RecoverFromDecodeError, Some(EngineOp::RecoverDecode))
    }

    fn release_buffer_before(&mut self, position: f64) -> Result<()> {
        self.record(EngineCall::ReleaseBufferBefore(position), Some(EngineOp::ReleaseBuffer))
    }

    fn destroy(&mut self) {
        let _ = self.record(EngineCall::Destroy, None);
        if let Some(record) = self.state.lock().engines.get_mut(self.id - 1) {
            record.destroyed = true;
        }
    }
}

/// How the simulated host answers play requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayPolicy {
    /// Start immediately
    #[default]
    Grant,

    /// Refuse, as a host enforcing a user-gesture policy would
    Reject,

    /// Hold the reply until the driver resolves it
    Defer,
}

/// A call received by the simulated sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Play(StartOrigin),
    Pause,
    Seek(f64),
    SetSource(String),
    ReleaseSource,
    SetListener(Option<u64>),
}

struct SinkState {
    position: f64,
    duration: f64,
    paused: bool,
    ready_state: ReadyState,
    buffered: Vec<TimeRange>,
    policy: PlayPolicy,
    fail_seek: bool,
    native_support: bool,
    listener: Option<SinkEvents>,
    pending: VecDeque<StartReply>,
    calls: Vec<SinkCall>,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            position: 0.0,
            duration: f64::INFINITY,
            paused: true,
            ready_state: ReadyState::HaveNothing,
            buffered: Vec::new(),
            policy: PlayPolicy::Grant,
            fail_seek: false,
            native_support: false,
            listener: None,
            pending: VecDeque::new(),
            calls: Vec::new(),
        }
    }
}

/// In-memory stand-in for the platform video element
#[derive(Default)]
pub struct SimulatedSink {
    state: Mutex<SinkState>,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_play_policy(&self, policy: PlayPolicy) {
        self.state.lock().policy = policy;
    }

    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    /// Move the playhead forward unless paused
    pub fn advance_position(&self, secs: f64) {
        let mut state = self.state.lock();
        if !state.paused {
            state.position += secs;
        }
    }

    pub fn set_duration(&self, duration: f64) {
        self.state.lock().duration = duration;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
    }

    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        self.state.lock().buffered = ranges;
    }

    /// Whether the sink claims native playback support for every URL
    pub fn set_native_support(&self, supported: bool) {
        self.state.lock().native_support = supported;
    }

    /// Make every seek fail until cleared
    pub fn set_seek_failure(&self, fail: bool) {
        self.state.lock().fail_seek = fail;
    }

    /// Emit through the installed listener; false when none is installed
    pub fn emit(&self, event: SinkEvent) -> bool {
        let listener = self.state.lock().listener.clone();
        match listener {
            Some(listener) => {
                listener.emit(event);
                true
            }
            None => false,
        }
    }

    /// Epoch of the installed listener
    pub fn listener_epoch(&self) -> Option<u64> {
        self.state.lock().listener.as_ref().map(SinkEvents::epoch)
    }

    pub fn pending_replies(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Answer the oldest deferred play request; false when none is pending
    pub fn resolve_pending(&self, grant: bool) -> bool {
        let reply = {
            let mut state = self.state.lock();
            let reply = state.pending.pop_front();
            if reply.is_some() && grant {
                state.paused = false;
            }
            reply
        };

        match reply {
            Some(reply) if grant => reply.grant(),
            Some(reply) => reply.reject("NotAllowedError: play() requires a user gesture"),
            None => return false,
        }
        true
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().calls.clone()
    }

    /// Number of play requests received
    pub fn play_requests(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Play(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl MediaSink for SimulatedSink {
    fn play(&self, reply: StartReply) {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(SinkCall::Play(reply.origin()));
            match state.policy {
                PlayPolicy::Grant => {
                    state.paused = false;
                    Some((reply, true))
                }
                PlayPolicy::Reject => Some((reply, false)),
                PlayPolicy::Defer => {
                    state.pending.push_back(reply);
                    None
                }
            }
        };

        match reply {
            Some((reply, true)) => reply.grant(),
            Some((reply, false)) => reply.reject("NotAllowedError: play() requires a user gesture"),
            None => trace!("Simulated sink deferred a play request"),
        }
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Pause);
        state.paused = true;
    }

    fn seek(&self, position: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Seek(position));
        if state.fail_seek {
            return Err(PlaybackError::sink_error("simulated seek failure"));
        }
        state.position = clamp_position(position, state.duration);
        Ok(())
    }

    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn buffered_ranges(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn can_play_natively(&self, _url: &str) -> bool {
        self.state.lock().native_support
    }

    fn set_source(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::SetSource(url.to_string()));
        if !state.native_support {
            return Err(PlaybackError::Unsupported(format!("no native playback for {}", url)));
        }
        Ok(())
    }

    fn release_source(&self) {
        let aborted: Vec<StartReply> = {
            let mut state = self.state.lock();
            state.calls.push(SinkCall::ReleaseSource);
            state.buffered.clear();
            state.ready_state = ReadyState::HaveNothing;
            state.paused = true;
            state.pending.drain(..).collect()
        };

        for reply in aborted {
            reply.reject("AbortError: the media source was released");
        }
    }

    fn set_listener(&self, listener: Option<SinkEvents>) {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::SetListener(listener.as_ref().map(SinkEvents::epoch)));
        state.listener = listener;
    }
}
