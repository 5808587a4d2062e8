mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use deck_engine::{MemorySink, PlaybackConfig, Player, PlayerHandle};

use common::{sine_wav, wait_until};

/// Sample `live_render_loops` on a background thread until `stop` is set; returns the peak.
fn watch_live_loops(handle: PlayerHandle, stop: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut peak = 0;
        while !stop.load(Ordering::SeqCst) {
            peak = peak.max(handle.live_render_loops());
            thread::yield_now();
        }
        peak
    })
}

fn small_blocks() -> PlaybackConfig {
    PlaybackConfig {
        block_frames: 1024,
        ..PlaybackConfig::default()
    }
}

#[test]
fn rapid_replacement_never_overlaps_render_loops() {
    let dir = tempfile::tempdir().unwrap();
    let a = sine_wav(dir.path(), "a.wav", 44_100, 44_100 * 5, 0.5);
    let b = sine_wav(dir.path(), "b.wav", 22_050, 22_050 * 5, 0.5);

    let sink = Arc::new(MemorySink::counting(44_100).with_speed(1.0));
    let player = Player::spawn(sink.clone(), small_blocks());
    let handle = player.handle();

    let stop = Arc::new(AtomicBool::new(false));
    let monitor = watch_live_loops(handle.clone(), stop.clone());

    for i in 0..40 {
        let clip = if i % 2 == 0 { &a } else { &b };
        handle.load_and_play(clip).unwrap();
        if i % 5 == 0 {
            thread::sleep(Duration::from_millis(5));
        }
    }
    wait_until(|| handle.live_render_loops() == 1);

    stop.store(true, Ordering::SeqCst);
    let peak = monitor.join().unwrap();
    assert!(peak <= 1, "saw {peak} render loops at once");
    assert_eq!(sink.max_concurrent_writers(), 1);

    handle.stop().unwrap();
    assert_eq!(handle.live_render_loops(), 0);
}

#[test]
fn stepping_through_a_list_keeps_one_session() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["1.wav", "2.wav", "3.wav", "4.wav"] {
        sine_wav(dir.path(), name, 44_100, 44_100 * 3, 0.5);
    }

    let sink = Arc::new(MemorySink::counting(44_100).with_speed(1.0));
    let player = Player::spawn(sink.clone(), small_blocks());
    let handle = player.handle();
    handle.select_directory(dir.path()).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let monitor = watch_live_loops(handle.clone(), stop.clone());

    for i in 0..30 {
        if i % 3 == 2 {
            assert!(handle.prev().is_some());
        } else {
            assert!(handle.next().is_some());
        }
    }
    // 20 forward and 10 back from an unset cursor lands on index 9 % 4.
    assert_eq!(handle.status().unwrap().track_index, Some(1));

    stop.store(true, Ordering::SeqCst);
    assert!(monitor.join().unwrap() <= 1);
    assert_eq!(sink.max_concurrent_writers(), 1);
}

#[test]
fn concurrent_callers_do_not_deadlock() {
    let dir = tempfile::tempdir().unwrap();
    let clip = sine_wav(dir.path(), "clip.wav", 32_000, 32_000 * 4, 0.5);

    let sink = Arc::new(MemorySink::counting(44_100).with_speed(1.0));
    let player = Player::spawn(sink.clone(), small_blocks());
    let handle = player.handle();

    let stop = Arc::new(AtomicBool::new(false));
    let monitor = watch_live_loops(handle.clone(), stop.clone());

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let handle = handle.clone();
            let clip = clip.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    // Errors like NoTrackLoaded are expected when another worker just stopped.
                    match (w + i) % 5 {
                        0 => {
                            let _ = handle.load_and_play(&clip);
                        }
                        1 => {
                            let _ = handle.toggle_pause();
                        }
                        2 => {
                            let _ = handle.seek(1_000);
                        }
                        3 => handle.set_volume(-1.0),
                        _ => {
                            let _ = handle.stop();
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    handle.stop().unwrap();
    stop.store(true, Ordering::SeqCst);
    assert!(monitor.join().unwrap() <= 1);
    assert_eq!(handle.live_render_loops(), 0);
    assert_eq!(sink.max_concurrent_writers(), 1);
    assert!(!sink.is_paused());
}
