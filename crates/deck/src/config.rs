use std::path::PathBuf;

use anyhow::{Result, anyhow};
use deck_engine::gain::clamp_volume_db;
use deck_engine::queue::calc_max_buffered_samples;
use deck_engine::{OutputConfig, PlaybackConfig};

use crate::cli::{Args, Command};

/// What the session starts with.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    File(PathBuf),
    Dir { path: PathBuf, start: Option<usize> },
}

#[derive(Clone, Debug)]
pub struct DeckConfig {
    pub source: Source,
    pub device: Option<String>,
    pub playback: PlaybackConfig,
}

impl DeckConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let source = match &args.cmd {
            Some(Command::Play { path }) => Source::File(path.clone()),
            Some(Command::Dir { path, start }) => Source::Dir {
                path: path.clone(),
                start: *start,
            },
            None => return Err(anyhow!("nothing to play; use `deck play <file>` or `deck dir <dir>`")),
        };

        let defaults = PlaybackConfig::default();
        let queue_frames =
            calc_max_buffered_samples(defaults.output_rate, 1, args.buffer_seconds).max(1);
        let block_frames = args.block_frames.clamp(1, queue_frames);
        if block_frames != args.block_frames {
            tracing::warn!(
                requested = args.block_frames,
                block_frames,
                "render block clamped to the output queue size"
            );
        }

        let playback = PlaybackConfig {
            block_frames,
            chunk_frames: args.chunk_frames.max(1),
            buffer_seconds: args.buffer_seconds,
            resample_quality: args.resample_quality.into(),
            volume_db: clamp_volume_db(args.volume),
            auto_advance: !args.no_auto_advance,
            ..defaults
        };

        Ok(Self {
            source,
            device: normalize_device_name(args.device.clone()),
            playback,
        })
    }

    pub fn output(&self) -> OutputConfig {
        OutputConfig {
            device: self.device.clone(),
            ..OutputConfig::from(&self.playback)
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
