//! Remote transport tests
//!
//! Key mapping is verified against a mock transport; the seek, stop and
//! pause semantics against a live controller and simulated sink.

use anyhow::Result;
use mockall::mock;
use mockall::predicate::eq;
use tvplay::player::PlaybackStatus;
use tvplay::remote::{RemoteKey, RemoteTransport, Transport};
use tvplay::sim::SinkCall;
use tvplay::StartOrigin;
use tvplay_integration_tests::{Harness, STREAM_A};

mock! {
    pub Remote {}

    impl Transport for Remote {
        fn play(&self);
        fn pause(&self);
        fn toggle_play_pause(&self);
        fn seek_by(&self, delta_secs: f64);
        fn reset_position(&self);
    }
}

#[test]
fn test_fast_forward_and_rewind_use_seek_step() {
    let mut mock = MockRemote::new();
    mock.expect_seek_by().with(eq(15.0)).times(1).return_const(());
    mock.expect_seek_by().with(eq(-15.0)).times(2).return_const(());

    let remote = RemoteTransport::new(mock, 15.0);
    assert!(remote.handle_key_code(417));
    assert!(remote.handle_key_code(412));
    assert!(remote.handle_key_name("MediaRewind"));
}

#[test]
fn test_stop_resets_position() {
    let mut mock = MockRemote::new();
    mock.expect_reset_position().times(1).return_const(());
    mock.expect_pause().never();

    let remote = RemoteTransport::new(mock, 10.0);
    remote.handle_key(RemoteKey::Stop);
}

#[test]
fn test_unknown_keys_are_not_handled() {
    let mut mock = MockRemote::new();
    mock.expect_play().never();
    mock.expect_pause().never();
    mock.expect_toggle_play_pause().never();
    mock.expect_seek_by().never();
    mock.expect_reset_position().never();

    let remote = RemoteTransport::new(mock, 10.0);
    assert!(!remote.handle_key_code(13));
    assert!(!remote.handle_key_name("ArrowUp"));
}

#[test]
fn test_seek_clamps_to_duration() -> Result<()> {
    let h = Harness::new()?;
    h.start_playing(STREAM_A);
    h.sink.set_duration(100.0);
    h.sink.set_position(95.0);
    h.sink.clear_calls();

    let remote = RemoteTransport::for_controller(h.controller.clone());
    remote.handle_key(RemoteKey::FastForward);
    assert_eq!(h.sink.calls(), vec![SinkCall::Seek(100.0)]);

    h.sink.set_position(4.0);
    remote.handle_key(RemoteKey::Rewind);
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Seek(0.0)));
    Ok(())
}

#[test]
fn test_seek_on_live_stream_only_clamps_at_zero() -> Result<()> {
    let h = Harness::new()?;
    h.start_playing(STREAM_A);
    h.sink.set_position(95.0);
    h.sink.clear_calls();

    h.controller.seek_by(10.0);
    assert_eq!(h.sink.calls(), vec![SinkCall::Seek(105.0)]);

    h.sink.set_duration(f64::NAN);
    h.controller.seek_by(-500.0);
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Seek(0.0)));
    Ok(())
}

#[test]
fn test_stop_key_keeps_session_attached() -> Result<()> {
    let h = Harness::new()?;
    h.start_playing(STREAM_A);
    h.sink.set_position(42.0);
    h.sink.clear_calls();

    let remote = RemoteTransport::for_controller(h.controller.clone());
    assert!(remote.handle_key_code(413));

    assert_eq!(h.sink.calls(), vec![SinkCall::Pause, SinkCall::Seek(0.0)]);
    assert_eq!(h.controller.status(), PlaybackStatus::Playing);
    assert_eq!(h.factory.live_instances(), 1);
    Ok(())
}

#[test]
fn test_toggle_pauses_and_resumes() -> Result<()> {
    let h = Harness::new()?;
    h.start_playing(STREAM_A);
    h.sink.clear_calls();

    let remote = RemoteTransport::for_controller(h.controller.clone());
    remote.handle_key(RemoteKey::TogglePlayPause);
    remote.handle_key(RemoteKey::TogglePlayPause);
    remote.handle_key(RemoteKey::Pause);
    remote.handle_key(RemoteKey::Play);

    assert_eq!(
        h.sink.calls(),
        vec![
            SinkCall::Pause,
            SinkCall::Play(StartOrigin::Resume),
            SinkCall::Pause,
            SinkCall::Play(StartOrigin::Resume),
        ]
    );
    Ok(())
}

#[test]
fn test_keys_without_session_do_nothing() -> Result<()> {
    let h = Harness::new()?;
    let remote = RemoteTransport::for_controller(h.controller.clone());

    for code in [415, 19, 10252, 413, 417, 412] {
        assert!(remote.handle_key_code(code));
    }
    assert!(h.sink.calls().is_empty());
    Ok(())
}

#[test]
fn test_keys_ignored_after_failure() -> Result<()> {
    let h = Harness::new()?;
    h.start_playing(STREAM_A);
    h.decode_error(true);
    h.decode_error(true);
    assert_eq!(h.controller.status(), PlaybackStatus::Failed);
    h.sink.clear_calls();

    h.controller.play();
    h.controller.seek_by(10.0);
    assert!(h.sink.calls().is_empty());
    Ok(())
}
