use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use deck_engine::ResampleQuality;

#[derive(Parser, Debug)]
#[command(name = "deck", version, about = "Play local audio files from the terminal")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Output queue depth in seconds
    #[arg(long, default_value_t = 0.5, global = true)]
    pub buffer_seconds: f32,

    /// Frames rendered per block (lower => snappier pause/seek, higher => less overhead)
    #[arg(long, default_value_t = 4410, global = true)]
    pub block_frames: usize,

    /// Resampler input chunk size in frames
    #[arg(long, default_value_t = 1024, global = true)]
    pub chunk_frames: usize,

    /// Resampler interpolation
    #[arg(long, value_enum, default_value_t = Quality::Cubic, global = true)]
    pub resample_quality: Quality,

    /// Initial volume in dB (clamped to -5..5)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true, global = true)]
    pub volume: f32,

    /// Stop after each track instead of continuing with the next one
    #[arg(long, global = true)]
    pub no_auto_advance: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a single file
    Play {
        /// Path to an mp3, wav, flac or ogg file
        path: PathBuf,
    },

    /// Use every playable file of a directory as the track list
    Dir {
        /// Directory to scan (not recursive)
        path: PathBuf,

        /// Index of the track to start with
        #[arg(long)]
        start: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Quality {
    Cubic,
    Sinc,
}

impl From<Quality> for ResampleQuality {
    fn from(q: Quality) -> Self {
        match q {
            Quality::Cubic => ResampleQuality::Cubic,
            Quality::Sinc => ResampleQuality::Sinc,
        }
    }
}
