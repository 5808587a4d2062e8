use std::time::Duration;

/// Fixed output rate the pipeline resamples to unless the device negotiates another.
pub const DEFAULT_OUTPUT_RATE: u32 = 44_100;

/// Interpolation used by the resample stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResampleQuality {
    /// Four-point cubic polynomial interpolation.
    #[default]
    Cubic,
    /// Windowed sinc interpolation (higher quality, more CPU).
    Sinc,
}

/// Playback tuning parameters shared by the decode/resample/gain/render stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Output rate requested from the device (Hz).
    pub output_rate: u32,
    /// Frames pulled from the pipeline per render-loop iteration.
    pub block_frames: usize,
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Target depth of the device queue in seconds.
    pub buffer_seconds: f32,
    /// Period of the position poller.
    pub position_interval: Duration,
    /// Interpolation quality of the resample stage.
    pub resample_quality: ResampleQuality,
    /// Gain applied to the first session (dB).
    pub volume_db: f32,
    /// Gain base; the multiplier is `volume_base ^ volume_db`.
    pub volume_base: f32,
    /// Chain into the next track of the list on natural completion.
    pub auto_advance: bool,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for low-latency local playback.
    fn default() -> Self {
        Self {
            output_rate: DEFAULT_OUTPUT_RATE,
            block_frames: 4410,
            chunk_frames: 1024,
            buffer_seconds: 0.5,
            position_interval: Duration::from_millis(500),
            resample_quality: ResampleQuality::Cubic,
            volume_db: 0.0,
            volume_base: 2.0,
            auto_advance: true,
        }
    }
}

/// Output device selection for [`crate::output::DeviceSink`].
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Case-insensitive substring of the device name; `None` selects the host default.
    pub device: Option<String>,
    /// Requested device sample rate (Hz).
    pub sample_rate: u32,
    /// Queue depth in front of the device callback, in seconds.
    pub buffer_seconds: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: DEFAULT_OUTPUT_RATE,
            buffer_seconds: 0.5,
        }
    }
}

impl From<&PlaybackConfig> for OutputConfig {
    fn from(playback: &PlaybackConfig) -> Self {
        Self {
            device: None,
            sample_rate: playback.output_rate,
            buffer_seconds: playback.buffer_seconds,
        }
    }
}
