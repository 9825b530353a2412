//! Playback controller implementation for tvplay
//!
//! [`PlaybackController`] owns at most one live session. Every input is
//! serialised through the mailbox and checked against the session epoch
//! before it may touch state, so callbacks from a torn-down session are
//! dropped no matter when they arrive.

use crate::engine::{EngineEvent, EngineEvents, EngineFactory, StreamEngine};
use crate::media::{buffered_ahead, MediaSink, SinkEvent, SinkEvents, StartReply};
use crate::player::autoplay::{AutoplayNegotiator, StartOrigin, StartOutcome};
use crate::player::hygiene::trim_point;
use crate::player::mailbox::{Input, InputTarget, Mailbox, Port, TimerKind, TransportCommand};
use crate::player::recovery::{decide, ErrorEvent, FailureKind, RecoveryAction};
use crate::player::session::Session;
use crate::player::watchdog::StallVerdict;
use crate::player::{PlaybackEvent, PlaybackEventHandler, PlaybackStatus};
use crate::timer::{Scheduler, TimerHandle, TokioScheduler};
use crate::utils::clamp_position;
use crate::utils::config::PlaybackConfig;
use crate::utils::error::{PlaybackError, Result};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Builder for [`PlaybackController`]
pub struct PlaybackControllerBuilder {
    sink: Arc<dyn MediaSink>,
    factory: Arc<dyn EngineFactory>,
    config: PlaybackConfig,
    scheduler: Option<Arc<dyn Scheduler>>,
    event_handlers: Vec<Box<dyn PlaybackEventHandler>>,
}

impl PlaybackControllerBuilder {
    /// Create a builder around the platform sink and engine factory
    pub fn new(sink: Arc<dyn MediaSink>, factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            sink,
            factory,
            config: PlaybackConfig::default(),
            scheduler: None,
            event_handlers: Vec::new(),
        }
    }

    /// Set controller configuration
    pub fn with_config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific scheduler instead of the current tokio runtime
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Add an event handler
    pub fn with_event_handler(mut self, handler: Box<dyn PlaybackEventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Build the controller
    ///
    /// Fails on invalid configuration, or when no scheduler was given and
    /// no tokio runtime is running.
    pub fn build(self) -> Result<PlaybackController> {
        self.config.validate()?;

        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::current()?),
        };

        let (status_tx, _) = watch::channel(PlaybackStatus::Idle);
        let shared = Arc::new_cyclic(|self_ref| Shared {
            self_ref: self_ref.clone(),
            config: self.config,
            sink: self.sink,
            factory: self.factory,
            scheduler,
            epoch: AtomicU64::new(0),
            mailbox: Mailbox::default(),
            core: Mutex::new(Core {
                status: PlaybackStatus::Idle,
                last_error: None,
                session: None,
            }),
            view: RwLock::new(View::default()),
            status_tx,
            handlers: Mutex::new(self.event_handlers),
            subscribers: Mutex::new(Vec::new()),
        });

        Ok(PlaybackController { shared })
    }
}

/// Handle to the adaptive stream playback controller
///
/// Clones share the same controller. Dropping the last clone releases the
/// live session.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    pub fn builder(sink: Arc<dyn MediaSink>, factory: Arc<dyn EngineFactory>) -> PlaybackControllerBuilder {
        PlaybackControllerBuilder::new(sink, factory)
    }

    /// Replace the current session with one playing `source_url`
    ///
    /// The previous session is always torn down first, even for an identical
    /// URL. A blank URL leaves the controller idle.
    pub fn attach(&self, source_url: &str) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Attach requested for epoch {}", epoch);
        self.shared.post(Input::Attach {
            epoch,
            url: source_url.to_string(),
        });
    }

    /// Release the live session, if any. Idempotent.
    pub fn teardown(&self) {
        self.shared.post(Input::Teardown);
    }

    /// Explicit user interaction; retries a refused start once
    pub fn user_gesture(&self) {
        self.shared.post(Input::Gesture);
    }

    pub fn play(&self) {
        self.shared.post(Input::Transport(TransportCommand::Play));
    }

    pub fn pause(&self) {
        self.shared.post(Input::Transport(TransportCommand::Pause));
    }

    pub fn toggle_play_pause(&self) {
        self.shared.post(Input::Transport(TransportCommand::TogglePlayPause));
    }

    /// Seek relative to the playhead, clamped to the media bounds
    pub fn seek_by(&self, delta_secs: f64) {
        self.shared.post(Input::Transport(TransportCommand::SeekBy(delta_secs)));
    }

    /// Pause and rewind to the start without releasing the session
    pub fn reset_position(&self) {
        self.shared.post(Input::Transport(TransportCommand::ResetPosition));
    }

    /// Current status
    pub fn status(&self) -> PlaybackStatus {
        *self.shared.status_tx.borrow()
    }

    /// Read-only status stream
    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Message to display while the session is `Failed`
    pub fn last_error_message(&self) -> Option<String> {
        self.shared.view.read().last_error.clone()
    }

    /// Epoch of the most recent attach request
    pub fn epoch(&self) -> u64 {
        self.shared.current_epoch()
    }

    pub fn network_retry_count(&self) -> u32 {
        self.shared.view.read().network_retry_count
    }

    pub fn source_url(&self) -> Option<String> {
        self.shared.view.read().source_url.clone()
    }

    /// Whether the "press to start" affordance should be shown
    pub fn is_awaiting_gesture(&self) -> bool {
        self.shared.view.read().awaiting_gesture
    }

    /// Play requests the host refused during the live session
    pub fn autoplay_rejections(&self) -> u32 {
        self.shared.view.read().autoplay_rejections
    }

    /// Timers currently owned by the live session
    pub fn active_timers(&self) -> usize {
        self.shared.view.read().active_timers
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    /// Receive every event published from now on
    pub fn subscribe_events(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Add an event handler. Handlers must not add handlers themselves.
    pub fn add_event_handler(&self, handler: Box<dyn PlaybackEventHandler>) {
        self.shared.handlers.lock().push(handler);
    }
}

/// Mutable controller state, only touched while processing an input
struct Core {
    status: PlaybackStatus,
    last_error: Option<String>,
    session: Option<Session>,
}

/// Snapshot published after every input for lock-free reads
#[derive(Debug, Clone, Default)]
struct View {
    last_error: Option<String>,
    network_retry_count: u32,
    source_url: Option<String>,
    awaiting_gesture: bool,
    autoplay_rejections: u32,
    active_timers: usize,
}

type Outbox = Vec<PlaybackEvent>;

struct Shared {
    self_ref: Weak<Shared>,
    config: PlaybackConfig,
    sink: Arc<dyn MediaSink>,
    factory: Arc<dyn EngineFactory>,
    scheduler: Arc<dyn Scheduler>,
    epoch: AtomicU64,
    mailbox: Mailbox,
    core: Mutex<Core>,
    view: RwLock<View>,
    status_tx: watch::Sender<PlaybackStatus>,
    handlers: Mutex<Vec<Box<dyn PlaybackEventHandler>>>,
    subscribers: Mutex<Vec<Sender<PlaybackEvent>>>,
}

impl InputTarget for Shared {
    fn post(&self, input: Input) {
        if self.mailbox.push(input) {
            self.mailbox.drain(|next| self.process(next));
        }
    }
}

impl Shared {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn port(&self, epoch: u64) -> Port {
        let target: Weak<dyn InputTarget> = self.self_ref.clone();
        Port::new(epoch, target)
    }

    fn process(&self, input: Input) {
        let mut out = Outbox::new();
        {
            let mut core = self.core.lock();
            let core = &mut *core;

            match input {
                Input::Attach { epoch, url } => self.handle_attach(core, &mut out, epoch, &url),
                Input::Teardown => self.teardown_session(core, &mut out),
                Input::Engine { epoch, event } => {
                    if self.accepts(core, epoch) {
                        self.handle_engine_event(core, &mut out, event);
                    }
                }
                Input::Sink { epoch, event } => {
                    if self.accepts(core, epoch) {
                        self.handle_sink_event(core, &mut out, event);
                    }
                }
                Input::StartOutcome { epoch, origin, outcome } => {
                    if self.accepts(core, epoch) {
                        self.handle_start_outcome(core, &mut out, origin, outcome);
                    }
                }
                Input::Timer { epoch, kind } => {
                    if self.accepts(core, epoch) {
                        self.handle_timer(core, &mut out, kind);
                    }
                }
                Input::Gesture => self.handle_gesture(core),
                Input::Transport(command) => self.handle_transport(core, command),
            }

            self.refresh_view(core);
        }
        self.dispatch(out);
    }

    /// Whether an epoch-stamped input may act on the live session
    fn accepts(&self, core: &Core, epoch: u64) -> bool {
        let live = epoch == self.current_epoch()
            && core.session.as_ref().is_some_and(|s| s.epoch == epoch);
        if !live {
            trace!("Dropping stale input for epoch {}", epoch);
            return false;
        }
        if core.status == PlaybackStatus::Failed {
            trace!("Session {} has failed; input ignored", epoch);
            return false;
        }
        true
    }

    // ---- session lifecycle ----

    fn handle_attach(&self, core: &mut Core, out: &mut Outbox, epoch: u64, url: &str) {
        self.teardown_session(core, out);

        if epoch != self.current_epoch() {
            debug!("Attach for epoch {} superseded before it ran", epoch);
            return;
        }

        let url = url.trim();
        if url.is_empty() {
            info!("Blank source URL; staying idle");
            return;
        }

        info!("Attaching session {} to {}", epoch, url);
        core.session = Some(Session::new(epoch, url));
        out.push(PlaybackEvent::SessionAttached {
            epoch,
            url: url.to_string(),
        });
        self.set_status(core, out, PlaybackStatus::Loading);

        self.sink.set_listener(Some(SinkEvents::new(self.port(epoch))));

        let native = match self.construct_engine(epoch, url) {
            Ok(engine) => {
                if let Some(session) = core.session.as_mut() {
                    session.engine = Some(engine);
                }
                false
            }
            Err(PlaybackError::Unsupported(reason)) if self.sink.can_play_natively(url) => {
                match self.sink.set_source(url) {
                    Ok(()) => {
                        info!("{}; sink plays {} natively", reason, url);
                        true
                    }
                    Err(e) => {
                        error!("Native playback of {} failed: {}", url, e);
                        self.fail(core, out, FailureKind::Unsupported, &e.to_string());
                        return;
                    }
                }
            }
            Err(e) => {
                error!("Could not start playback of {}: {}", url, e);
                self.fail(core, out, FailureKind::Unsupported, &e.to_string());
                return;
            }
        };

        if let Some(session) = core.session.as_mut() {
            session.native = native;
        }
        self.start_session_timers(core, epoch);

        // no manifest event without an engine
        if native {
            self.start_after_manifest(core);
        }
    }

    fn construct_engine(&self, epoch: u64, url: &str) -> Result<Box<dyn StreamEngine>> {
        if !self.factory.is_supported() {
            return Err(PlaybackError::Unsupported(
                "segmented streaming is not available on this platform".to_string(),
            ));
        }

        let mut engine = self.factory.create(EngineEvents::new(self.port(epoch)))?;

        if let Err(e) = engine.attach_to_sink(Arc::clone(&self.sink)) {
            engine.destroy();
            return Err(e);
        }

        if let Err(e) = engine.load(url) {
            engine.detach_from_sink();
            engine.destroy();
            return Err(e);
        }

        Ok(engine)
    }

    fn start_session_timers(&self, core: &mut Core, epoch: u64) {
        let watchdog = self.schedule_repeating(epoch, self.config.watchdog.interval(), TimerKind::StallCheck);
        let hygiene = self.schedule_repeating(epoch, self.config.hygiene.interval(), TimerKind::BufferTrim);
        let position = self.sink.position();
        let now = self.scheduler.now();

        if let Some(session) = core.session.as_mut() {
            session.stall.observe(position, now);
            session.track_timer(watchdog);
            session.track_timer(hygiene);
        }
    }

    /// Cancel timers, detach the engine and reset the sink
    fn teardown_session(&self, core: &mut Core, out: &mut Outbox) {
        core.last_error = None;

        let Some(mut session) = core.session.take() else {
            trace!("Teardown with no live session");
            self.set_status(core, out, PlaybackStatus::Idle);
            return;
        };

        let cancelled = session.cancel_timers();
        self.sink.set_listener(None);
        session.release_engine();
        self.sink.release_source();
        if let Err(e) = self.sink.seek(0.0) {
            debug!("Could not reset sink position: {}", e);
        }

        info!("Session {} torn down ({} timers cancelled)", session.epoch, cancelled);
        self.transition(core, out, session.epoch, PlaybackStatus::Idle, false);
        out.push(PlaybackEvent::SessionTornDown { epoch: session.epoch });
    }

    // ---- engine and sink events ----

    fn handle_engine_event(&self, core: &mut Core, out: &mut Outbox, event: EngineEvent) {
        match event {
            EngineEvent::ManifestReady => {
                info!("Manifest ready");
                self.start_after_manifest(core);
            }
            EngineEvent::SegmentBuffered => self.confirm_progress(core, out),
            EngineEvent::QualityChanged { level } => {
                debug!("Engine switched to quality level {}", level);
                out.push(PlaybackEvent::QualityChanged {
                    epoch: live_epoch(core),
                    level,
                });
            }
            EngineEvent::Error(error) => self.classify(core, out, error),
        }
    }

    fn handle_sink_event(&self, core: &mut Core, out: &mut Outbox, event: SinkEvent) {
        match event {
            SinkEvent::Playing => {
                let cleared = core
                    .session
                    .as_mut()
                    .map(|s| s.autoplay.on_granted())
                    .unwrap_or(false);
                if cleared {
                    out.push(PlaybackEvent::GesturePrompt {
                        epoch: live_epoch(core),
                        visible: false,
                    });
                }
                self.confirm_progress(core, out);
                if matches!(core.status, PlaybackStatus::Loading | PlaybackStatus::AwaitingGesture) {
                    self.set_status(core, out, PlaybackStatus::Playing);
                }
            }
            SinkEvent::Waiting | SinkEvent::Stalled => {
                debug!("Sink reported {:?}; the watchdog decides whether this is a stall", event);
            }
            SinkEvent::CanPlay | SinkEvent::Progress => trace!("Sink reported {:?}", event),
            SinkEvent::Error(kind) => self.classify(core, out, ErrorEvent::from_sink(kind)),
        }
    }

    /// A segment was buffered or the sink resumed: the incident is over
    fn confirm_progress(&self, core: &mut Core, out: &mut Outbox) {
        let Some(session) = core.session.as_mut() else {
            return;
        };

        let retries = session.budget.network_retry_count;
        if session.budget.reset() {
            info!("Playback progressing; recovery budget reset after {} network retries", retries);
        }
        session.stall.stalled_since = None;
        let settled = settled_status(&session.autoplay);

        if matches!(core.status, PlaybackStatus::Recovering | PlaybackStatus::Stalled) {
            self.set_status(core, out, settled);
        }
    }

    // ---- autoplay ----

    fn start_after_manifest(&self, core: &Core) {
        let Some(session) = core.session.as_ref() else {
            return;
        };

        if session.autoplay.is_awaiting_gesture() {
            debug!("Manifest ready while awaiting a gesture; not retrying silently");
            return;
        }

        let origin = if session.autoplay.is_granted() {
            StartOrigin::Resume
        } else {
            StartOrigin::Autoplay
        };
        self.request_play(core, origin);
    }

    fn request_play(&self, core: &Core, origin: StartOrigin) {
        let Some(session) = core.session.as_ref() else {
            return;
        };
        debug!("Requesting playback ({:?}) for session {}", origin, session.epoch);
        self.sink.play(StartReply::new(self.port(session.epoch), origin));
    }

    fn handle_start_outcome(&self, core: &mut Core, out: &mut Outbox, origin: StartOrigin, outcome: StartOutcome) {
        let epoch = live_epoch(core);
        let Some(session) = core.session.as_mut() else {
            return;
        };

        match outcome {
            StartOutcome::Granted => {
                info!("Playback start granted ({:?})", origin);
                if session.autoplay.on_granted() {
                    out.push(PlaybackEvent::GesturePrompt { epoch, visible: false });
                }
                if matches!(core.status, PlaybackStatus::Loading | PlaybackStatus::AwaitingGesture) {
                    self.set_status(core, out, PlaybackStatus::Playing);
                }
            }
            StartOutcome::Rejected(reason) => {
                warn!("Playback start rejected ({:?}): {}", origin, reason);
                session.autoplay.on_rejected();
                self.set_status(core, out, PlaybackStatus::AwaitingGesture);
                out.push(PlaybackEvent::GesturePrompt { epoch, visible: true });
            }
        }
    }

    fn handle_gesture(&self, core: &mut Core) {
        if core.status == PlaybackStatus::Failed {
            debug!("Gesture ignored: session has failed");
            return;
        }
        let Some(session) = core.session.as_mut() else {
            debug!("Gesture ignored: no session");
            return;
        };

        if session.autoplay.take_gesture() {
            info!("User gesture; retrying playback start");
            self.request_play(core, StartOrigin::Gesture);
        } else {
            debug!("Gesture ignored: no start retry pending");
        }
    }

    // ---- error classification ----

    fn classify(&self, core: &mut Core, out: &mut Outbox, error: ErrorEvent) {
        let Some(session) = core.session.as_mut() else {
            return;
        };
        let action = decide(&error, &mut session.budget, &self.config.recovery);
        let retry_count = session.budget.network_retry_count;

        match action {
            RecoveryAction::Ignore => {
                debug!("Ignoring non-fatal {} error: {}", error.category, error.detail);
            }
            RecoveryAction::ResumeLoading { delay } => {
                warn!("Transient network error ({}); resuming in {:?}", error.detail, delay);
                self.enter_recovery(core, out, &error, retry_count);
                self.schedule_for_session(core, delay, TimerKind::ResumeLoading);
            }
            RecoveryAction::RecoverDecode { settle_delay } => {
                self.recover_decode(core, out, error, settle_delay);
            }
            RecoveryAction::RetryLoad { delay, attempt } => {
                warn!(
                    "Fatal network error ({}); reload attempt {}/{} in {:?}",
                    error.detail, attempt, self.config.recovery.max_network_retries, delay
                );
                self.enter_recovery(core, out, &error, retry_count);
                self.schedule_for_session(core, delay, TimerKind::ReloadSource);
            }
            RecoveryAction::Fail(kind) => self.fail(core, out, kind, &error.detail),
        }
    }

    fn recover_decode(&self, core: &mut Core, out: &mut Outbox, error: ErrorEvent, settle_delay: Duration) {
        match engine_call(core, |engine| engine.recover_from_decode_error()) {
            Ok(()) => {
                warn!("Media decode error ({}); engine recovery issued", error.detail);
                let retry_count = core.session.as_ref().map_or(0, |s| s.budget.network_retry_count);
                self.enter_recovery(core, out, &error, retry_count);
                self.schedule_for_session(core, settle_delay, TimerKind::DecodeSettled);
            }
            Err(e) if !error.fatal => {
                warn!("In-place decode recovery failed ({}); escalating", e);
                self.classify(core, out, error.escalated());
            }
            Err(e) => {
                error!("Decode recovery failed: {}", e);
                let detail = format!("{}: {}", error.detail, e);
                self.fail(core, out, FailureKind::Decode, &detail);
            }
        }
    }

    fn enter_recovery(&self, core: &mut Core, out: &mut Outbox, error: &ErrorEvent, retry_count: u32) {
        let epoch = live_epoch(core);
        self.transition(core, out, epoch, PlaybackStatus::Recovering, true);
        out.push(PlaybackEvent::RecoveryStarted {
            epoch,
            category: error.category,
            fatal: error.fatal,
            retry_count,
        });
    }

    fn fail(&self, core: &mut Core, out: &mut Outbox, kind: FailureKind, detail: &str) {
        let epoch = live_epoch(core);
        let message = kind.user_message(detail);
        error!("Session {} failed: {}", epoch, message);

        if let Some(session) = core.session.as_mut() {
            session.cancel_timers();
            match kind {
                FailureKind::Unsupported => session.release_engine(),
                FailureKind::NetworkExhausted | FailureKind::Decode => {
                    if let Some(engine) = session.engine.as_mut() {
                        engine.stop_loading();
                    }
                }
            }
            if session.autoplay.is_awaiting_gesture() {
                out.push(PlaybackEvent::GesturePrompt { epoch, visible: false });
            }
        }

        core.last_error = Some(message.clone());
        self.set_status(core, out, PlaybackStatus::Failed);
        out.push(PlaybackEvent::Failed { epoch, kind, message });
    }

    // ---- timers ----

    fn handle_timer(&self, core: &mut Core, out: &mut Outbox, kind: TimerKind) {
        match kind {
            TimerKind::StallCheck => self.check_stall(core, out),
            TimerKind::BufferTrim => self.trim_buffer(core, out),
            TimerKind::ResumeLoading if is_native(core) => {
                debug!("Native source resumes loading on its own");
            }
            TimerKind::ResumeLoading => {
                if let Err(e) = engine_call(core, |engine| engine.resume_loading()) {
                    warn!("Resume after transient network error failed ({}); escalating", e);
                    self.classify(core, out, ErrorEvent::network(true, e.to_string()));
                }
            }
            TimerKind::ReloadSource if is_native(core) => {
                let url = core.session.as_ref().map(|s| s.source_url.clone()).unwrap_or_default();
                match self.sink.set_source(&url) {
                    Ok(()) => {
                        info!("Native source {} reloaded", url);
                        self.start_after_manifest(core);
                    }
                    Err(e) => {
                        warn!("Native reload of {} failed: {}", url, e);
                        self.classify(core, out, ErrorEvent::network(true, e.to_string()));
                    }
                }
            }
            TimerKind::ReloadSource => {
                let url = core.session.as_ref().map(|s| s.source_url.clone()).unwrap_or_default();
                match engine_call(core, |engine| engine.load(&url)) {
                    Ok(()) => info!("Reload issued for {}", url),
                    Err(e) => {
                        warn!("Reload of {} failed: {}", url, e);
                        self.classify(core, out, ErrorEvent::network(true, e.to_string()));
                    }
                }
            }
            TimerKind::DecodeSettled => {
                if core.last_error.take().is_some() {
                    debug!("Cleared surfaced error text after decode recovery");
                }
                let granted = core.session.as_ref().is_some_and(|s| s.autoplay.is_granted());
                if granted {
                    self.request_play(core, StartOrigin::Resume);
                }
            }
        }
    }

    fn check_stall(&self, core: &mut Core, out: &mut Outbox) {
        if !core.status.is_monitored() {
            trace!("Watchdog idle while {}", core.status);
            return;
        }

        let position = self.sink.position();
        let paused = self.sink.is_paused();
        let ready_state = self.sink.ready_state();
        let ahead = buffered_ahead(&self.sink.buffered_ranges(), position);
        let now = self.scheduler.now();

        let Some(session) = core.session.as_mut() else {
            return;
        };
        let epoch = session.epoch;
        let verdict = session
            .stall
            .assess(position, paused, ready_state, ahead, &self.config.watchdog);
        let stalled_for = session.stall.record(verdict, now);
        let mut observed = position;

        match verdict {
            StallVerdict::Paused => trace!("Sink paused at {:.2}s; not a stall", position),
            StallVerdict::Holding => {
                debug!("Playhead holding at {:.2}s with healthy read-ahead", position);
            }
            StallVerdict::Progressing { delta } => {
                trace!("Playhead advanced {:.2}s", delta);
                if core.status == PlaybackStatus::Stalled {
                    self.set_status(core, out, PlaybackStatus::Playing);
                }
            }
            StallVerdict::Stalled => {
                warn!(
                    "Playback stalled at {:.2}s ({:?}, {:.1}s ahead, stalled for {:?}); nudging",
                    position,
                    ready_state,
                    ahead,
                    stalled_for.unwrap_or_default()
                );
                self.set_status(core, out, PlaybackStatus::Stalled);
                out.push(PlaybackEvent::StallDetected { epoch, position });

                if let Err(e) = engine_call(core, |engine| engine.resume_loading()) {
                    debug!("Resume during stall recovery failed, retrying next tick: {}", e);
                }

                let target = position + self.config.watchdog.nudge_secs;
                match self.sink.seek(target) {
                    Ok(()) => observed = target,
                    Err(e) => debug!("Nudge failed, retrying next tick: {}", e),
                }
                self.request_play(core, StartOrigin::Resume);
            }
        }

        if let Some(session) = core.session.as_mut() {
            session.stall.observe(observed, now);
        }
    }

    fn trim_buffer(&self, core: &mut Core, out: &mut Outbox) {
        if is_native(core) {
            trace!("Buffer trim skipped: the sink manages its own buffer");
            return;
        }

        let position = self.sink.position();
        let Some(before) = trim_point(position, &self.config.hygiene) else {
            trace!("Buffer trim skipped at {:.2}s", position);
            return;
        };

        match engine_call(core, |engine| engine.release_buffer_before(before)) {
            Ok(()) => {
                debug!("Released buffered media before {:.1}s", before);
                out.push(PlaybackEvent::BufferTrimmed {
                    epoch: live_epoch(core),
                    before,
                });
            }
            Err(e) => warn!("Buffer trim failed (ignored): {}", e),
        }
    }

    fn schedule_for_session(&self, core: &mut Core, delay: Duration, kind: TimerKind) {
        let Some(session) = core.session.as_mut() else {
            return;
        };
        let port = self.port(session.epoch);
        let timer = self.scheduler.schedule_once(
            delay,
            Box::new(move || {
                port.post(Input::Timer {
                    epoch: port.epoch(),
                    kind,
                })
            }),
        );
        session.track_timer(timer);
    }

    fn schedule_repeating(&self, epoch: u64, period: Duration, kind: TimerKind) -> TimerHandle {
        let port = self.port(epoch);
        self.scheduler.schedule_repeating(
            period,
            Box::new(move || {
                port.post(Input::Timer {
                    epoch: port.epoch(),
                    kind,
                })
            }),
        )
    }

    // ---- transport ----

    fn handle_transport(&self, core: &mut Core, command: TransportCommand) {
        if core.session.is_none() || core.status == PlaybackStatus::Failed {
            debug!("Transport {:?} ignored: no playable session", command);
            return;
        }

        match command {
            TransportCommand::Play => self.transport_play(core),
            TransportCommand::Pause => self.sink.pause(),
            TransportCommand::TogglePlayPause => {
                let awaiting = core.session.as_ref().is_some_and(|s| s.autoplay.is_awaiting_gesture());
                if awaiting || self.sink.is_paused() {
                    self.transport_play(core);
                } else {
                    self.sink.pause();
                }
            }
            TransportCommand::SeekBy(delta) => {
                let target = clamp_position(self.sink.position() + delta, self.sink.duration());
                match self.sink.seek(target) {
                    Ok(()) => {
                        debug!("Seeked to {:.2}s", target);
                        self.rebase_stall_tracker(core, target);
                    }
                    Err(e) => warn!("Seek to {:.2}s failed: {}", target, e),
                }
            }
            TransportCommand::ResetPosition => {
                self.sink.pause();
                match self.sink.seek(0.0) {
                    Ok(()) => self.rebase_stall_tracker(core, 0.0),
                    Err(e) => warn!("Reset to start failed: {}", e),
                }
            }
        }
    }

    /// A seek moves the playhead; the next probe measures from the new position
    fn rebase_stall_tracker(&self, core: &mut Core, position: f64) {
        let now = self.scheduler.now();
        if let Some(session) = core.session.as_mut() {
            session.stall.observe(position, now);
            session.stall.stalled_since = None;
        }
    }

    fn transport_play(&self, core: &mut Core) {
        let Some(session) = core.session.as_mut() else {
            return;
        };

        if session.autoplay.is_awaiting_gesture() {
            if session.autoplay.take_gesture() {
                info!("Play key pressed; retrying playback start");
                self.request_play(core, StartOrigin::Gesture);
            } else {
                debug!("Play key ignored: start retry already pending");
            }
        } else {
            self.request_play(core, StartOrigin::Resume);
        }
    }

    // ---- status and publication ----

    fn set_status(&self, core: &mut Core, out: &mut Outbox, to: PlaybackStatus) {
        let epoch = live_epoch(core);
        self.transition(core, out, epoch, to, false);
    }

    /// Move to `to`; with `reenter` a same-status transition is still reported
    fn transition(&self, core: &mut Core, out: &mut Outbox, epoch: u64, to: PlaybackStatus, reenter: bool) {
        let from = core.status;
        if from == to && !reenter {
            return;
        }

        core.status = to;
        self.status_tx.send_replace(to);

        if from == to {
            debug!("Session {} re-entered {}", epoch, to);
        } else {
            info!("Session {}: {} -> {}", epoch, from, to);
        }
        out.push(PlaybackEvent::StatusChanged { epoch, from, to });
    }

    fn refresh_view(&self, core: &Core) {
        let mut view = self.view.write();
        view.last_error = core.last_error.clone();
        match core.session.as_ref() {
            Some(session) => {
                view.network_retry_count = session.budget.network_retry_count;
                view.source_url = Some(session.source_url.clone());
                view.awaiting_gesture = session.autoplay.is_awaiting_gesture()
                    && core.status == PlaybackStatus::AwaitingGesture;
                view.autoplay_rejections = session.autoplay.rejections();
                view.active_timers = session.active_timers();
            }
            None => *view = View::default(),
        }
    }

    fn dispatch(&self, out: Outbox) {
        if out.is_empty() {
            return;
        }

        {
            let mut handlers = self.handlers.lock();
            for event in &out {
                for handler in handlers.iter_mut() {
                    handler.handle_event(event.clone());
                }
            }
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| out.iter().all(|event| tx.send(event.clone()).is_ok()));
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Some(mut session) = core.session.take() {
            session.cancel_timers();
            self.sink.set_listener(None);
            session.release_engine();
            self.sink.release_source();
            debug!("Controller dropped; session {} released", session.epoch);
        }
    }
}

fn is_native(core: &Core) -> bool {
    core.session.as_ref().is_some_and(|s| s.native)
}

fn live_epoch(core: &Core) -> u64 {
    core.session.as_ref().map_or(0, |s| s.epoch)
}

/// Status to return to once an incident is over
fn settled_status(autoplay: &AutoplayNegotiator) -> PlaybackStatus {
    if autoplay.is_granted() {
        PlaybackStatus::Playing
    } else if autoplay.is_awaiting_gesture() {
        PlaybackStatus::AwaitingGesture
    } else {
        PlaybackStatus::Loading
    }
}

fn engine_call<T>(core: &mut Core, op: impl FnOnce(&mut dyn StreamEngine) -> Result<T>) -> Result<T> {
    match core.session.as_mut().and_then(|s| s.engine.as_deref_mut()) {
        Some(engine) => op(engine),
        None => Err(PlaybackError::engine_error("no engine attached to the session")),
    }
}
