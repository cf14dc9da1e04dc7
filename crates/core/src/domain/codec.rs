//! Wire sample codec
//!
//! Converts interleaved device samples to and from the normalized
//! `[-1.0, 1.0]` floats the effects operate on.

use crate::domain::audio::SampleFormat;

/// A sample type that can travel over the device wire
pub trait WireSample: Copy + Default + Send + Sync + 'static {
    /// Format tag matching this sample type
    const FORMAT: SampleFormat;

    /// Wire value to normalized float
    fn decode(self) -> f32;

    /// Normalized float to wire value, clamping out-of-range input
    fn encode(value: f32) -> Self;
}

impl WireSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::I16;

    #[inline]
    fn decode(self) -> f32 {
        self as f32 / 32768.0
    }

    #[inline]
    fn encode(value: f32) -> Self {
        // `as` saturates, so +1.0 lands on i16::MAX
        (value.clamp(-1.0, 1.0) * 32768.0) as i16
    }
}

impl WireSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    #[inline]
    fn decode(self) -> f32 {
        self
    }

    #[inline]
    fn encode(value: f32) -> Self {
        value.clamp(-1.0, 1.0)
    }
}

/// Average one interleaved frame down to a single processing sample
#[inline]
pub fn downmix<S: WireSample>(frame: &[S]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s.decode()).sum();
    sum / frame.len() as f32
}

/// Write one processed sample to every channel of an output frame
#[inline]
pub fn fan_out<S: WireSample>(value: f32, frame: &mut [S]) {
    frame.fill(S::encode(value));
}
