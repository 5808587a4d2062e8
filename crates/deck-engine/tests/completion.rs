mod common;

use std::sync::Arc;
use std::time::Duration;

use deck_engine::{MemorySink, PlaybackConfig, Player, PlayerEvent};
use deck_types::{PlaybackEndReason, PlayerState};

use common::{collect_until, count_completions, drain_for, sine_wav, wait_until};

#[test]
fn natural_end_fires_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let clip = sine_wav(dir.path(), "short.wav", 44_100, 11_025, 0.5);

    let player = Player::spawn(
        Arc::new(MemorySink::counting(44_100)),
        PlaybackConfig::default(),
    );
    let handle = player.handle();
    let events = player.events();

    handle.load_and_play(&clip).unwrap();
    let mut seen = collect_until(&events, |e| *e == PlayerEvent::TrackCompleted);
    seen.extend(drain_for(&events, Duration::from_millis(300)));
    assert_eq!(count_completions(&seen), 1, "{seen:?}");

    // Stopping after completion is a no-op.
    handle.stop().unwrap();
    handle.stop().unwrap();
    let after = drain_for(&events, Duration::from_millis(100));
    assert_eq!(count_completions(&after), 0);
    assert!(after.is_empty(), "{after:?}");
    assert_eq!(
        handle.status().unwrap().end_reason,
        Some(PlaybackEndReason::Eof)
    );
}

#[test]
fn stop_twice_tears_down_without_completion() {
    let dir = tempfile::tempdir().unwrap();
    let clip = sine_wav(dir.path(), "long.wav", 44_100, 44_100 * 10, 0.5);

    let player = Player::spawn(
        Arc::new(MemorySink::counting(44_100).with_speed(1.0)),
        PlaybackConfig::default(),
    );
    let handle = player.handle();
    let events = player.events();

    handle.load_and_play(&clip).unwrap();
    wait_until(|| handle.live_render_loops() == 1);
    std::thread::sleep(Duration::from_millis(50));

    handle.stop().unwrap();
    handle.stop().unwrap();
    assert_eq!(handle.live_render_loops(), 0);

    let seen = drain_for(&events, Duration::from_millis(300));
    assert_eq!(count_completions(&seen), 0, "{seen:?}");
    assert!(seen.contains(&PlayerEvent::StateChanged(PlayerState::Stopped)));

    let status = handle.status().unwrap();
    assert_eq!(status.state, PlayerState::Idle);
    assert_eq!(status.end_reason, Some(PlaybackEndReason::Stopped));
    assert_eq!(status.position_frames, None);

    // The buffer stays loaded, so play starts a fresh session.
    handle.play().unwrap();
    assert_eq!(handle.status().unwrap().state, PlayerState::Playing);
}

#[test]
fn replacing_a_session_does_not_signal_completion() {
    let dir = tempfile::tempdir().unwrap();
    let a = sine_wav(dir.path(), "a.wav", 44_100, 44_100 * 5, 0.5);
    let b = sine_wav(dir.path(), "b.wav", 22_050, 22_050 * 5, 0.5);

    let player = Player::spawn(
        Arc::new(MemorySink::counting(44_100).with_speed(1.0)),
        PlaybackConfig::default(),
    );
    let handle = player.handle();
    let events = player.events();

    handle.load_and_play(&a).unwrap();
    handle.load_and_play(&b).unwrap();
    handle.stop().unwrap();

    let seen = drain_for(&events, Duration::from_millis(300));
    assert_eq!(count_completions(&seen), 0, "{seen:?}");
}

#[test]
fn auto_advance_walks_the_list_and_wraps() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["1.wav", "2.wav", "3.wav"] {
        sine_wav(dir.path(), name, 44_100, 2_205, 0.5);
    }

    let player = Player::spawn(
        Arc::new(MemorySink::counting(44_100)),
        PlaybackConfig::default(),
    );
    let handle = player.handle();
    let events = player.events();

    handle.select_directory(dir.path()).unwrap();
    handle.select(1).unwrap();

    let mut started = Vec::new();
    let seen = collect_until(&events, |e| {
        if let PlayerEvent::TrackStarted { index, .. } = e {
            started.push(*index);
        }
        started.len() == 4
    });
    assert_eq!(started, vec![Some(1), Some(2), Some(0), Some(1)]);
    assert_eq!(count_completions(&seen), 3);
}

#[test]
fn disabled_auto_advance_stops_after_one_track() {
    let dir = tempfile::tempdir().unwrap();
    sine_wav(dir.path(), "1.wav", 44_100, 2_205, 0.5);
    sine_wav(dir.path(), "2.wav", 44_100, 2_205, 0.5);

    let config = PlaybackConfig {
        auto_advance: false,
        ..PlaybackConfig::default()
    };
    let player = Player::spawn(Arc::new(MemorySink::counting(44_100)), config);
    let handle = player.handle();
    let events = player.events();

    handle.select_directory(dir.path()).unwrap();
    handle.select(0).unwrap();
    collect_until(&events, |e| *e == PlayerEvent::TrackCompleted);

    let after = drain_for(&events, Duration::from_millis(200));
    assert!(!after.iter().any(|e| matches!(e, PlayerEvent::TrackStarted { .. })));
    assert_eq!(handle.status().unwrap().state, PlayerState::Idle);
    assert_eq!(handle.status().unwrap().track_index, Some(0));
}

#[test]
fn corrupt_track_reports_decode_failure_and_keeps_engine_usable() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.flac");
    std::fs::write(&broken, vec![0x13u8; 4_096]).unwrap();
    let good = sine_wav(dir.path(), "good.wav", 44_100, 2_205, 0.5);

    let player = Player::spawn(
        Arc::new(MemorySink::counting(44_100)),
        PlaybackConfig::default(),
    );
    let handle = player.handle();
    let events = player.events();

    let err = handle.load_and_play(&broken).unwrap_err();
    assert!(matches!(err, deck_engine::PlayerError::DecodeFailed(_)), "{err}");
    assert_eq!(
        handle.status().unwrap().end_reason,
        Some(PlaybackEndReason::Error)
    );

    handle.load_and_play(&good).unwrap();
    collect_until(&events, |e| *e == PlayerEvent::TrackCompleted);
}
