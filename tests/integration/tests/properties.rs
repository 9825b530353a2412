//! Property tests for session ownership and the retry budget

use proptest::prelude::*;
use tvplay::player::PlaybackStatus;
use tvplay::PlaybackConfig;
use tvplay_integration_tests::{recoveries, Harness};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_at_most_one_live_session(urls in prop::collection::vec("[a-c ]{0,4}", 1..12)) {
        let h = Harness::new().unwrap();
        for url in &urls {
            h.controller.attach(url);
            prop_assert!(h.factory.live_instances() <= 1);
        }

        let last_live = !urls.last().unwrap().trim().is_empty();
        prop_assert_eq!(h.controller.epoch(), urls.len() as u64);
        prop_assert_eq!(h.factory.live_instances(), usize::from(last_live));
        prop_assert_eq!(h.clock.pending_timers(), if last_live { 2 } else { 0 });
        prop_assert_eq!(
            h.sink.listener_epoch(),
            last_live.then_some(urls.len() as u64)
        );
    }

    #[test]
    fn prop_stale_engines_never_change_state(stale_count in 1usize..6, errors in 1usize..5) {
        let h = Harness::new().unwrap();
        for i in 0..=stale_count {
            h.start_playing(&format!("https://cdn.example/stream-{}.m3u8", i));
        }
        h.take_events();

        for id in 1..=stale_count {
            let events = h.factory.events(id).unwrap();
            for _ in 0..errors {
                events.error(tvplay::EngineErrorKind::Network, true, "late");
            }
        }

        prop_assert_eq!(h.controller.status(), PlaybackStatus::Playing);
        prop_assert_eq!(h.controller.network_retry_count(), 0);
        prop_assert!(h.take_events().is_empty());
    }

    #[test]
    fn prop_fatal_network_retries_are_bounded(max in 0u32..5, errors in 1u32..10) {
        let mut config = PlaybackConfig::default();
        config.recovery.max_network_retries = max;
        let h = Harness::with_config(config).unwrap();
        h.start_playing("https://cdn.example/stream.m3u8");

        for _ in 0..errors {
            h.network_error(true);
            h.advance_ms(600);
        }

        let events = h.take_events();
        prop_assert_eq!(recoveries(&events) as u32, errors.min(max));
        let expected = if errors > max { PlaybackStatus::Failed } else { PlaybackStatus::Recovering };
        prop_assert_eq!(h.controller.status(), expected);
    }
}
