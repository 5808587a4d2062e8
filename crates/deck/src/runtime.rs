//! Terminal runtime.
//!
//! Opens the output device, starts the player, then multiplexes player events, stdin
//! commands and Ctrl-C until the user quits.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Receiver;
use deck_engine::gain::clamp_volume_db;
use deck_engine::{AudioSink, DeviceSink, Player, PlayerError, PlayerEvent, PlayerHandle, device};

use crate::config::{DeckConfig, Source};
use crate::console::{ConsoleCommand, HELP, describe_event, parse_command, seconds_to_frames};

/// Print output devices to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for (i, name) in device::list_devices(&host)?.iter().enumerate() {
        println!("#{i}: {name}");
    }
    Ok(())
}

/// Play `config.source` on the selected device until the user quits.
pub fn run(config: DeckConfig) -> Result<()> {
    let sink = DeviceSink::open(&config.output())?;
    if sink.sample_rate() != config.playback.output_rate {
        tracing::info!(
            requested = config.playback.output_rate,
            actual = sink.sample_rate(),
            "device runs at a different rate; resampling to it"
        );
    }
    let sink: Arc<dyn AudioSink> = Arc::new(sink);

    let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    }) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }

    let lines = spawn_stdin_reader();
    let mut out = std::io::stdout();
    run_session(&config, sink, lines, quit_rx, &mut out)
}

/// Drive one player with the given inputs. Returns when the user quits, Ctrl-C fires, or a
/// single-file session completes.
pub fn run_session(
    config: &DeckConfig,
    sink: Arc<dyn AudioSink>,
    mut lines: Receiver<String>,
    mut quit: Receiver<()>,
    out: &mut dyn Write,
) -> Result<()> {
    let rate = sink.sample_rate();
    let player = Player::spawn(sink, config.playback.clone());
    let handle = player.handle();
    let events = player.events();

    start(&handle, &config.source)?;
    writeln!(out, "{HELP}")?;
    let single_file = matches!(config.source, Source::File(_));

    loop {
        crossbeam_channel::select! {
            recv(events) -> event => {
                let Ok(event) = event else { break };
                writeln!(out, "{}", describe_event(&event, rate))?;
                if single_file && event == PlayerEvent::TrackCompleted {
                    break;
                }
            }
            recv(lines) -> line => match line {
                Ok(line) => {
                    if !apply_line(&handle, &line, rate, out)? {
                        break;
                    }
                }
                // Stdin closed; keep playing until quit or completion.
                Err(_) => lines = crossbeam_channel::never(),
            },
            recv(quit) -> signal => match signal {
                Ok(()) => {
                    tracing::info!("interrupted");
                    break;
                }
                Err(_) => quit = crossbeam_channel::never(),
            },
        }
    }

    player.shutdown();
    Ok(())
}

fn start(handle: &PlayerHandle, source: &Source) -> Result<()> {
    match source {
        Source::File(path) => handle
            .load_and_play(path)
            .with_context(|| format!("play {}", path.display())),
        Source::Dir { path, start } => {
            let tracks = handle
                .select_directory(path)
                .with_context(|| format!("scan {}", path.display()))?;
            if tracks.is_empty() {
                return Err(anyhow!("no playable files in {}", path.display()));
            }
            handle.select(start.unwrap_or(0))?;
            Ok(())
        }
    }
}

/// Apply one stdin line. Returns `false` when the user asked to quit.
fn apply_line(handle: &PlayerHandle, line: &str, rate: u32, out: &mut dyn Write) -> Result<bool> {
    let cmd = match parse_command(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return Ok(true),
        Err(msg) => {
            writeln!(out, "{msg}")?;
            return Ok(true);
        }
    };

    match cmd {
        ConsoleCommand::TogglePause => report(out, handle.toggle_pause().map(|_| ()))?,
        ConsoleCommand::Next => {
            if handle.next().is_none() {
                writeln!(out, "no track list")?;
            }
        }
        ConsoleCommand::Prev => {
            if handle.prev().is_none() {
                writeln!(out, "no track list")?;
            }
        }
        ConsoleCommand::Seek(secs) => report(out, handle.seek(seconds_to_frames(secs, rate)))?,
        ConsoleCommand::Volume(db) => {
            let db = clamp_volume_db(db);
            handle.set_volume(db);
            writeln!(out, "volume {db:+.1} dB")?;
        }
        ConsoleCommand::ToggleMute => {
            let muted = !handle.status()?.muted;
            handle.set_muted(muted);
            writeln!(out, "{}", if muted { "muted" } else { "unmuted" })?;
        }
        ConsoleCommand::Info => {
            let snapshot = handle.status()?;
            writeln!(out, "{}", serde_json::to_string_pretty(&snapshot)?)?;
        }
        ConsoleCommand::Stop => handle.stop()?,
        ConsoleCommand::Replay => report(out, handle.play())?,
        ConsoleCommand::Quit => return Ok(false),
        ConsoleCommand::Help => writeln!(out, "{HELP}")?,
    }
    Ok(true)
}

fn report(out: &mut dyn Write, result: Result<(), PlayerError>) -> Result<()> {
    if let Err(e) = result {
        writeln!(out, "error: {e}")?;
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_engine::{MemorySink, PlaybackConfig};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn write_wav(dir: &Path, name: &str, rate: u32, frames: usize) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn config(source: Source) -> DeckConfig {
        DeckConfig {
            source,
            device: None,
            playback: PlaybackConfig::default(),
        }
    }

    fn run_to_string(config: &DeckConfig, input: &[&str], quit: bool) -> String {
        let (lines_tx, lines_rx) = crossbeam_channel::unbounded();
        for line in input {
            lines_tx.send(line.to_string()).unwrap();
        }
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        if quit {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(200));
                let _ = quit_tx.send(());
            });
        } else {
            drop(quit_tx);
        }

        let sink: Arc<dyn AudioSink> = Arc::new(MemorySink::counting(44_100).with_speed(1.0));
        let mut out = Vec::new();
        run_session(config, sink, lines_rx, quit_rx, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn single_file_session_ends_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_wav(dir.path(), "short.wav", 22_050, 2_205);
        let out = run_to_string(&config(Source::File(clip)), &[], false);
        assert!(out.contains("short.wav"), "{out}");
        assert!(out.contains("track finished"), "{out}");
    }

    #[test]
    fn info_prints_status_json_and_q_quits() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_wav(dir.path(), "long.wav", 44_100, 44_100 * 20);
        let out = run_to_string(
            &config(Source::File(clip)),
            &["p", "i", "bogus", "q"],
            false,
        );
        assert!(out.contains("\"state\": \"paused\""), "{out}");
        assert!(out.contains("unknown command `bogus`"), "{out}");
        assert!(!out.contains("track finished"), "{out}");
    }

    #[test]
    fn ctrl_c_ends_a_directory_session() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(dir.path(), "a.wav", 44_100, 44_100 * 20);
        write_wav(dir.path(), "b.wav", 44_100, 44_100 * 20);
        let cfg = config(Source::Dir {
            path: dir.path().to_path_buf(),
            start: Some(1),
        });
        let out = run_to_string(&cfg, &[], true);
        assert!(out.contains("[2] b.wav"), "{out}");
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_lines_tx, lines_rx) = crossbeam_channel::unbounded();
        let (_quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        let sink: Arc<dyn AudioSink> = Arc::new(MemorySink::counting(44_100));
        let cfg = config(Source::Dir {
            path: dir.path().to_path_buf(),
            start: None,
        });
        let err = run_session(&cfg, sink, lines_rx, quit_rx, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no playable files"));
    }
}
