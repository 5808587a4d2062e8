//! In-memory WAV fixtures for unit tests.

use std::io::Cursor;

fn write_wav(rate: u32, channels: u16, frames: usize, sample: impl Fn(usize, u16) -> i16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                writer.write_sample(sample(i, ch)).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// 440 Hz sine at `amplitude` (0..1) on every channel.
pub(crate) fn sine_wav(rate: u32, channels: u16, frames: usize, amplitude: f32) -> Vec<u8> {
    write_wav(rate, channels, frames, |i, _| {
        let t = i as f32 / rate as f32;
        let v = amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        (v * i16::MAX as f32) as i16
    })
}

/// Channel 0 carries the frame index, channel 1 its negation.
pub(crate) fn ramp_wav(rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    write_wav(rate, channels, frames, |i, ch| {
        let v = i as i16;
        if ch == 1 { v.wrapping_neg() } else { v }
    })
}
