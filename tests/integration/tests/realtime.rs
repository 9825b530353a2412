//! Controller on the tokio scheduler
//!
//! The runtime clock is paused, so sleeping auto-advances time and timers
//! fire deterministically.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tvplay::player::{PlaybackController, PlaybackStatus};
use tvplay::sim::{EngineCall, Scenario, ScenarioRig, SimulatedFactory, SimulatedSink};
use tvplay::{EngineEvent, ErrorEvent, ReadyState};
use tvplay_integration_tests::STREAM_A;

fn rig() -> Result<(PlaybackController, Arc<SimulatedSink>, Arc<SimulatedFactory>)> {
    let sink = Arc::new(SimulatedSink::new());
    let factory = Arc::new(SimulatedFactory::new());
    let controller = PlaybackController::builder(sink.clone(), factory.clone()).build()?;
    Ok((controller, sink, factory))
}

#[tokio::test(start_paused = true)]
async fn test_transient_resume_on_tokio_timers() -> Result<()> {
    let (controller, sink, factory) = rig()?;
    controller.attach(STREAM_A);
    sink.set_ready_state(ReadyState::HaveEnoughData);
    factory.emit(EngineEvent::ManifestReady);
    assert_eq!(controller.status(), PlaybackStatus::Playing);

    factory.emit(EngineEvent::Error(ErrorEvent::network(false, "segment timeout")));
    assert_eq!(controller.status(), PlaybackStatus::Recovering);

    sleep(Duration::from_millis(350)).await;
    assert!(factory.calls(1).contains(&EngineCall::ResumeLoading));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_status_stream_observes_stall() -> Result<()> {
    let (controller, sink, factory) = rig()?;
    let mut status = controller.subscribe_status();

    controller.attach(STREAM_A);
    factory.emit(EngineEvent::ManifestReady);
    status.borrow_and_update();

    // no data and a frozen playhead
    sink.set_ready_state(ReadyState::HaveNothing);
    tokio::time::timeout(Duration::from_secs(15), status.changed()).await??;
    assert_eq!(*status.borrow(), PlaybackStatus::Stalled);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_teardown_aborts_runtime_timers() -> Result<()> {
    let (controller, sink, factory) = rig()?;
    controller.attach(STREAM_A);
    factory.emit(EngineEvent::ManifestReady);
    sink.set_position(300.0);

    controller.teardown();
    sleep(Duration::from_secs(600)).await;

    assert!(!factory
        .calls(1)
        .iter()
        .any(|c| matches!(c, EngineCall::ReleaseBufferBefore(_) | EngineCall::ResumeLoading)));
    assert_eq!(controller.status(), PlaybackStatus::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_scenario_replays_in_realtime() -> Result<()> {
    let (controller, sink, factory) = rig()?;
    let scenario = Scenario::parse(
        r#"
source = "https://cdn.example/live/stream-A.m3u8"
tail_ms = 1000

[[steps]]
at_ms = 100
action = "manifest_ready"

[[steps]]
at_ms = 1100
action = "error"
category = "network_transient"
fatal = true

[[steps]]
at_ms = 2100
action = "error"
category = "network_transient"
fatal = true

[[steps]]
at_ms = 3000
action = "segment_buffered"
"#,
    )?;

    let rig = ScenarioRig {
        controller: &controller,
        sink: &sink,
        factory: &factory,
    };
    scenario.run(&rig, None).await?;

    assert_eq!(controller.status(), PlaybackStatus::Playing);
    assert_eq!(controller.network_retry_count(), 0);
    let loads = factory
        .calls(1)
        .iter()
        .filter(|c| matches!(c, EngineCall::Load(_)))
        .count();
    assert_eq!(loads, 3);
    Ok(())
}
