//! Stdin command parsing and event formatting.

use deck_engine::PlayerEvent;

pub const HELP: &str = "commands: p pause/resume | n next | b previous | s <sec> seek | \
v <db> volume | m mute | i status | st stop | r replay | q quit";

#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    TogglePause,
    Next,
    Prev,
    /// Seek target in seconds.
    Seek(f64),
    /// Volume in dB.
    Volume(f32),
    ToggleMute,
    Info,
    Stop,
    Replay,
    Quit,
    Help,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();

    let cmd = match word {
        "p" => ConsoleCommand::TogglePause,
        "n" => ConsoleCommand::Next,
        "b" => ConsoleCommand::Prev,
        "s" => {
            let secs = parse_arg::<f64>(arg, "s <seconds>")?;
            ConsoleCommand::Seek(secs)
        }
        "v" => {
            let db = parse_arg::<f32>(arg, "v <db>")?;
            ConsoleCommand::Volume(db)
        }
        "m" => ConsoleCommand::ToggleMute,
        "i" => ConsoleCommand::Info,
        "st" => ConsoleCommand::Stop,
        "r" => ConsoleCommand::Replay,
        "q" => ConsoleCommand::Quit,
        "h" | "?" => ConsoleCommand::Help,
        other => return Err(format!("unknown command `{other}`; {HELP}")),
    };
    Ok(Some(cmd))
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&str>, usage: &str) -> Result<T, String> {
    arg.ok_or_else(|| format!("usage: {usage}"))?
        .parse::<T>()
        .map_err(|_| format!("usage: {usage}"))
}

/// Output frame for `seconds` at `rate`. Negative input stays negative so the player rejects it.
pub fn seconds_to_frames(seconds: f64, rate: u32) -> i64 {
    (seconds * rate as f64).round() as i64
}

/// `m:ss` clock for a frame count.
pub fn format_clock(frames: u64, rate: u32) -> String {
    let secs = if rate == 0 { 0 } else { frames / rate as u64 };
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Line to print for a player notification.
pub fn describe_event(event: &PlayerEvent, output_rate: u32) -> String {
    match event {
        PlayerEvent::StatusChanged(text) => text.clone(),
        PlayerEvent::PositionChanged(frame) => format!("  {}", format_clock(*frame, output_rate)),
        PlayerEvent::TrackCompleted => "track finished".to_string(),
        PlayerEvent::TrackStarted {
            index: Some(i),
            track,
        } => format!("[{}] {}", i + 1, track.display_name()),
        PlayerEvent::TrackStarted { index: None, track } => track.display_name(),
        PlayerEvent::StateChanged(state) => format!("state: {state:?}").to_lowercase(),
    }
}
