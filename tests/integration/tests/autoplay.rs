//! Autoplay negotiation tests

use anyhow::Result;
use tvplay::player::{PlaybackEvent, PlaybackStatus};
use tvplay::remote::RemoteTransport;
use tvplay::sim::{PlayPolicy, SinkCall};
use tvplay::{EngineEvent, StartOrigin};
use tvplay_integration_tests::{status_trail, Harness, STREAM_A, STREAM_B};

fn rejected_harness() -> Result<Harness> {
    let h = Harness::new()?;
    h.sink.set_play_policy(PlayPolicy::Reject);
    h.start_playing(STREAM_A);
    Ok(h)
}

#[test]
fn test_rejected_autoplay_waits_for_gesture() -> Result<()> {
    let h = rejected_harness()?;

    assert_eq!(h.controller.status(), PlaybackStatus::AwaitingGesture);
    assert!(h.controller.is_awaiting_gesture());
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Play(StartOrigin::Autoplay)));

    let events = h.take_events();
    assert_eq!(
        status_trail(&events),
        vec![PlaybackStatus::Loading, PlaybackStatus::AwaitingGesture]
    );
    assert!(events.contains(&PlaybackEvent::GesturePrompt {
        epoch: 1,
        visible: true
    }));
    Ok(())
}

#[test]
fn test_gesture_retries_exactly_once() -> Result<()> {
    let h = rejected_harness()?;
    assert_eq!(h.sink.play_requests(), 1);

    h.controller.user_gesture();
    assert_eq!(h.sink.play_requests(), 2);
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Play(StartOrigin::Gesture)));
    assert_eq!(h.controller.status(), PlaybackStatus::AwaitingGesture);

    // the second rejection does not retry on its own
    h.factory.emit(EngineEvent::ManifestReady);
    h.advance_ms(60_000);
    assert_eq!(h.sink.play_requests(), 2);

    // a fresh gesture is allowed
    h.sink.set_play_policy(PlayPolicy::Grant);
    h.controller.user_gesture();
    assert_eq!(h.sink.play_requests(), 3);
    assert_eq!(h.controller.status(), PlaybackStatus::Playing);
    assert!(!h.controller.is_awaiting_gesture());
    Ok(())
}

#[test]
fn test_repeated_gestures_while_pending_retry_once() -> Result<()> {
    let h = rejected_harness()?;
    h.sink.set_play_policy(PlayPolicy::Defer);

    h.controller.user_gesture();
    h.controller.user_gesture();
    h.controller.user_gesture();
    assert_eq!(h.sink.play_requests(), 2);
    assert_eq!(h.sink.pending_replies(), 1);

    h.take_events();
    assert!(h.sink.resolve_pending(true));
    assert_eq!(h.controller.status(), PlaybackStatus::Playing);

    let events = h.take_events();
    assert!(events.contains(&PlaybackEvent::GesturePrompt {
        epoch: 1,
        visible: false
    }));
    Ok(())
}

#[test]
fn test_gesture_without_pending_retry_is_ignored() -> Result<()> {
    let h = Harness::new()?;
    h.controller.user_gesture();
    assert!(h.sink.calls().is_empty());

    h.start_playing(STREAM_A);
    h.controller.user_gesture();
    assert_eq!(h.sink.play_requests(), 1);
    Ok(())
}

#[test]
fn test_manifest_never_retries_silently() -> Result<()> {
    let h = rejected_harness()?;

    h.factory.emit(EngineEvent::ManifestReady);
    h.factory.emit(EngineEvent::ManifestReady);
    assert_eq!(h.sink.play_requests(), 1);
    Ok(())
}

#[test]
fn test_play_key_counts_as_gesture() -> Result<()> {
    let h = rejected_harness()?;
    h.sink.set_play_policy(PlayPolicy::Grant);

    let remote = RemoteTransport::for_controller(h.controller.clone());
    assert!(remote.handle_key_name("MediaPlayPause"));

    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Play(StartOrigin::Gesture)));
    assert_eq!(h.controller.status(), PlaybackStatus::Playing);
    Ok(())
}

#[test]
fn test_rejection_during_recovery_waits_for_gesture() -> Result<()> {
    let h = Harness::new()?;
    h.start_playing(STREAM_A);

    h.decode_error(false);
    h.sink.set_play_policy(PlayPolicy::Reject);
    h.advance_ms(1_000);
    assert_eq!(h.controller.status(), PlaybackStatus::AwaitingGesture);

    // progress does not bypass the user gesture
    h.segment_buffered();
    assert_eq!(h.controller.status(), PlaybackStatus::AwaitingGesture);

    h.sink.set_play_policy(PlayPolicy::Grant);
    h.controller.user_gesture();
    assert_eq!(h.controller.status(), PlaybackStatus::Playing);
    Ok(())
}

#[test]
fn test_reply_for_superseded_session_is_dropped() -> Result<()> {
    let h = Harness::new()?;
    h.sink.set_play_policy(PlayPolicy::Defer);
    h.start_playing(STREAM_A);
    assert_eq!(h.sink.pending_replies(), 1);

    // releasing the source aborts the pending request of the old session
    h.controller.attach(STREAM_B);
    assert_eq!(h.sink.pending_replies(), 0);
    assert_eq!(h.controller.status(), PlaybackStatus::Loading);
    assert!(!h.controller.is_awaiting_gesture());
    Ok(())
}

#[test]
fn test_rejections_are_counted_per_session() -> Result<()> {
    let h = rejected_harness()?;
    assert_eq!(h.controller.autoplay_rejections(), 1);

    h.controller.user_gesture();
    assert_eq!(h.controller.autoplay_rejections(), 2);

    h.sink.set_play_policy(PlayPolicy::Grant);
    h.start_playing(STREAM_B);
    assert_eq!(h.controller.autoplay_rejections(), 0);
    Ok(())
}
