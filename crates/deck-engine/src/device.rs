//! Output device discovery and stream config selection for [`crate::output::DeviceSink`].

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Largest device period requested, in frames.
const MAX_PERIOD_FRAMES: u32 = 16_384;

/// Open the output device whose name contains `needle` (case-insensitive), or the host
/// default when `needle` is `None`.
pub fn open_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"));
    };

    host.output_devices()
        .context("enumerate output devices")?
        .find(|d| {
            d.description()
                .is_ok_and(|desc| matches_device_name(&desc.name(), needle))
        })
        .ok_or_else(|| anyhow!("no output device matched `{needle}`"))
}

/// Choose the stream config closest to `target_rate`.
///
/// Only formats the output callback can write are considered. Among them the rate nearest
/// the target wins; a tie goes to the higher rate, then to the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    device
        .supported_output_configs()
        .context("query output configs")?
        .filter_map(|range| {
            let (rate, fit) = fit(
                range.min_sample_rate(),
                range.max_sample_rate(),
                range.sample_format(),
                target_rate,
            )?;
            Some((fit, range.with_sample_rate(rate)))
        })
        .min_by_key(|(fit, _)| *fit)
        .map(|(_, config)| config)
        .ok_or_else(|| anyhow!("device offers no f32/i32/i16/u16 output config"))
}

/// Fixed device period: at most half the render queue so one callback never asks for
/// more than is buffered, within what the device supports.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    queue_frames: usize,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let wanted = u32::try_from(queue_frames / 2)
                .unwrap_or(u32::MAX)
                .min(MAX_PERIOD_FRAMES);
            Some(cpal::BufferSize::Fixed(wanted.clamp(*min, (*max).max(*min))))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Names of the host's output devices, in enumeration order.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("enumerate output devices")?;
    let mut names = Vec::new();
    for d in devices {
        names.push(d.description()?.to_string());
    }
    Ok(names)
}

/// How well a config range suits a target rate; smaller is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Fit {
    distance: u32,
    below_target: bool,
    format_rank: u8,
}

/// Rate to run a `[min, max]` range at for `target`, and its fit. `None` for sample
/// formats the callback cannot produce.
fn fit(min: u32, max: u32, format: cpal::SampleFormat, target: u32) -> Option<(u32, Fit)> {
    let format_rank = match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => return None,
    };
    let rate = target.clamp(min, max.max(min));
    Some((
        rate,
        Fit {
            distance: rate.abs_diff(target),
            below_target: rate < target,
            format_rank,
        },
    ))
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SampleFormat;

    fn best(ranges: &[(u32, u32, SampleFormat)], target: u32) -> Option<(u32, SampleFormat)> {
        ranges
            .iter()
            .filter_map(|&(min, max, format)| {
                fit(min, max, format, target).map(|(rate, fit)| (fit, rate, format))
            })
            .min_by_key(|(fit, _, _)| *fit)
            .map(|(_, rate, format)| (rate, format))
    }

    #[test]
    fn device_names_match_case_insensitively() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", " USB "));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn target_inside_a_range_is_used_as_is() {
        let got = best(&[(8_000, 192_000, SampleFormat::I16)], 44_100);
        assert_eq!(got, Some((44_100, SampleFormat::I16)));
    }

    #[test]
    fn nearest_rate_wins_and_ties_go_up() {
        let ranges = [
            (48_000, 48_000, SampleFormat::F32),
            (32_000, 32_000, SampleFormat::F32),
        ];
        assert_eq!(best(&ranges, 44_100), Some((48_000, SampleFormat::F32)));

        let tie = [
            (40_000, 40_000, SampleFormat::F32),
            (50_000, 50_000, SampleFormat::F32),
        ];
        assert_eq!(best(&tie, 45_000), Some((50_000, SampleFormat::F32)));
    }

    #[test]
    fn float_is_preferred_at_equal_rates() {
        let ranges = [
            (44_100, 48_000, SampleFormat::I16),
            (44_100, 48_000, SampleFormat::F32),
            (44_100, 48_000, SampleFormat::I32),
        ];
        assert_eq!(best(&ranges, 44_100), Some((44_100, SampleFormat::F32)));
    }

    #[test]
    fn formats_the_callback_cannot_write_are_skipped() {
        assert_eq!(best(&[(44_100, 44_100, SampleFormat::U8)], 44_100), None);
        let ranges = [
            (44_100, 44_100, SampleFormat::F64),
            (48_000, 48_000, SampleFormat::U16),
        ];
        assert_eq!(best(&ranges, 44_100), Some((48_000, SampleFormat::U16)));
    }
}
