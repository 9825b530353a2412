//! Scripted fault scenarios
//!
//! A scenario is a TOML file naming a source URL and a list of timed steps
//! to apply to the simulated collaborators:
//!
//! ```toml
//! source = "https://cdn.example/live/stream-A.m3u8"
//! tail_ms = 12000
//!
//! [[steps]]
//! at_ms = 100
//! action = "manifest_ready"
//!
//! [[steps]]
//! at_ms = 1100
//! action = "error"
//! category = "network_transient"
//! fatal = true
//! detail = "segment 12 timed out"
//! ```

use crate::engine::EngineEvent;
use crate::media::{ReadyState, SinkEvent};
use crate::player::{ErrorCategory, ErrorEvent, PlaybackController};
use crate::remote::RemoteTransport;
use crate::sim::{EngineOp, PlayPolicy, SimulatedFactory, SimulatedSink};
use crate::timer::ManualClock;
use crate::utils::error::{PlaybackError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A replayable fault script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Source attached before the first step
    pub source: String,

    /// Host answer to play requests until a step changes it
    #[serde(default)]
    pub play_policy: PlayPolicy,

    /// Emit `manifest_ready` automatically on every engine load
    #[serde(default)]
    pub auto_manifest: bool,

    /// Time to keep running after the last step
    #[serde(default)]
    pub tail_ms: u64,

    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

/// One timed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Offset from the start of the scenario
    pub at_ms: u64,

    #[serde(flatten)]
    pub action: ScenarioAction,
}

/// What a step does
///
/// Engine events go to the most recent engine unless `engine` names an
/// earlier one (1-based creation order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioAction {
    ManifestReady {
        #[serde(default)]
        engine: Option<usize>,
    },
    SegmentBuffered {
        #[serde(default)]
        engine: Option<usize>,
    },
    QualityChanged {
        level: usize,
        #[serde(default)]
        engine: Option<usize>,
    },
    Error {
        category: ErrorCategory,
        fatal: bool,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        engine: Option<usize>,
    },
    SinkEvent {
        event: SinkEvent,
    },
    AdvancePosition {
        secs: f64,
    },
    SetPaused {
        paused: bool,
    },
    ReadyState {
        level: u8,
    },
    PlayPolicy {
        policy: PlayPolicy,
    },
    ResolvePlay {
        grant: bool,
    },
    FailEngine {
        op: EngineOp,
        #[serde(default = "one")]
        count: u32,
    },
    Gesture,
    Attach {
        url: String,
    },
    Teardown,
    Key {
        name: String,
    },
}

fn one() -> u32 {
    1
}

/// The controller and its simulated collaborators
pub struct ScenarioRig<'a> {
    pub controller: &'a PlaybackController,
    pub sink: &'a SimulatedSink,
    pub factory: &'a SimulatedFactory,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut scenario: Scenario = toml::from_str(contents)
            .map_err(|e| PlaybackError::Scenario(format!("Invalid scenario: {}", e)))?;
        scenario.steps.sort_by_key(|step| step.at_ms);
        Ok(scenario)
    }

    /// Scenario that just plays `source`
    pub fn plain(source: &str) -> Self {
        Self {
            source: source.to_string(),
            play_policy: PlayPolicy::Grant,
            auto_manifest: true,
            tail_ms: 0,
            steps: Vec::new(),
        }
    }

    /// Attach the source and apply every step on time
    ///
    /// With a clock, time is virtual and advanced between steps; without
    /// one, the replay sleeps on the tokio runtime.
    pub async fn run(&self, rig: &ScenarioRig<'_>, clock: Option<&ManualClock>) -> Result<()> {
        rig.sink.set_play_policy(self.play_policy);
        rig.factory.set_auto_manifest(self.auto_manifest);

        info!("Replaying scenario for {} ({} steps)", self.source, self.steps.len());
        rig.controller.attach(&self.source);

        let mut elapsed = 0;
        for step in &self.steps {
            wait(clock, step.at_ms.saturating_sub(elapsed)).await;
            elapsed = elapsed.max(step.at_ms);
            debug!("t={}ms {:?}", elapsed, step.action);
            self.apply(&step.action, rig)?;
        }
        wait(clock, self.tail_ms).await;

        Ok(())
    }

    fn apply(&self, action: &ScenarioAction, rig: &ScenarioRig<'_>) -> Result<()> {
        let emit = |engine: &Option<usize>, event: EngineEvent| {
            let delivered = match engine {
                Some(id) => rig.factory.emit_from(*id, event),
                None => rig.factory.emit(event),
            };
            if !delivered {
                warn!("No engine to emit from; step skipped");
            }
        };

        match action {
            ScenarioAction::ManifestReady { engine } => emit(engine, EngineEvent::ManifestReady),
            ScenarioAction::SegmentBuffered { engine } => emit(engine, EngineEvent::SegmentBuffered),
            ScenarioAction::QualityChanged { level, engine } => {
                emit(engine, EngineEvent::QualityChanged { level: *level })
            }
            ScenarioAction::Error {
                category,
                fatal,
                detail,
                engine,
            } => emit(
                engine,
                EngineEvent::Error(ErrorEvent::new(*category, *fatal, detail.clone())),
            ),
            ScenarioAction::SinkEvent { event } => {
                if !rig.sink.emit(event.clone()) {
                    warn!("No sink listener installed; {:?} dropped", event);
                }
            }
            ScenarioAction::AdvancePosition { secs } => rig.sink.advance_position(*secs),
            ScenarioAction::SetPaused { paused } => rig.sink.set_paused(*paused),
            ScenarioAction::ReadyState { level } => rig.sink.set_ready_state(ReadyState::from_level(*level)),
            ScenarioAction::PlayPolicy { policy } => rig.sink.set_play_policy(*policy),
            ScenarioAction::ResolvePlay { grant } => {
                if !rig.sink.resolve_pending(*grant) {
                    warn!("No deferred play request to resolve");
                }
            }
            ScenarioAction::FailEngine { op, count } => rig.factory.fail_next(*op, *count),
            ScenarioAction::Gesture => rig.controller.user_gesture(),
            ScenarioAction::Attach { url } => rig.controller.attach(url),
            ScenarioAction::Teardown => rig.controller.teardown(),
            ScenarioAction::Key { name } => {
                let remote = RemoteTransport::for_controller(rig.controller.clone());
                if !remote.handle_key_name(name) {
                    return Err(PlaybackError::Scenario(format!("Unknown remote key '{}'", name)));
                }
            }
        }

        Ok(())
    }
}

async fn wait(clock: Option<&ManualClock>, ms: u64) {
    if ms == 0 {
        return;
    }
    let delay = Duration::from_millis(ms);
    match clock {
        Some(clock) => clock.advance(delay),
        None => tokio::time::sleep(delay).await,
    }
}
