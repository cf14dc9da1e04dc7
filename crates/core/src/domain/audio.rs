//! Audio device abstractions and domain models
//!
//! This module defines the platform-agnostic description of an effects
//! engine's I/O: which device to open, its channel layout, sample rate,
//! wire format and block geometry. The cpal implementation lives in the
//! `infra` crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for audio device
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Device id that selects the host's default device
pub const DEFAULT_DEVICE: &str = "default";

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this id asks for the host default instead of a named device
    pub fn is_default(&self) -> bool {
        self.0.is_empty() || self.0 == DEFAULT_DEVICE
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            hz => SampleRate::Custom(hz),
        }
    }
}

impl From<u32> for SampleRate {
    fn from(hz: u32) -> Self {
        Self::from_hz(hz)
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.hz()
    }
}

/// Number of audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum ChannelCount {
    Mono,
    Stereo,
    Multi(u16),
}

impl ChannelCount {
    pub fn count(&self) -> u16 {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
            ChannelCount::Multi(n) => *n,
        }
    }
}

impl From<u16> for ChannelCount {
    fn from(n: u16) -> Self {
        match n {
            1 => ChannelCount::Mono,
            2 => ChannelCount::Stereo,
            n => ChannelCount::Multi(n),
        }
    }
}

impl From<ChannelCount> for u16 {
    fn from(channels: ChannelCount) -> Self {
        channels.count()
    }
}

/// Wire sample formats the engine can stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::I16 => "i16",
            SampleFormat::F32 => "f32",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleFormat {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "i16" | "s16" => Ok(SampleFormat::I16),
            "f32" | "float" => Ok(SampleFormat::F32),
            other => Err(AudioError::UnsupportedConfiguration(format!(
                "sample format '{other}'"
            ))),
        }
    }
}

/// Everything needed to open an engine's capture and playback streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Device to open for both directions
    #[serde(default)]
    pub device: DeviceId,
    pub input_channels: ChannelCount,
    pub output_channels: ChannelCount,
    pub sample_rate: SampleRate,
    pub format: SampleFormat,
    /// Frames exchanged with the device per I/O call
    pub frames_per_block: u32,
    /// Device-side buffering, in blocks
    pub block_multiplier: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::default(),
            input_channels: ChannelCount::Stereo,
            output_channels: ChannelCount::Stereo,
            sample_rate: SampleRate::Hz48000,
            format: SampleFormat::I16,
            frames_per_block: 256,
            block_multiplier: 4,
        }
    }
}

impl StreamConfig {
    /// Interleaved samples in one capture block
    pub fn input_block_len(&self) -> usize {
        self.frames_per_block as usize * self.input_channels.count() as usize
    }

    /// Interleaved samples in one playback block
    pub fn output_block_len(&self) -> usize {
        self.frames_per_block as usize * self.output_channels.count() as usize
    }

    /// Total device-side buffer in frames
    pub fn buffer_frames(&self) -> usize {
        self.frames_per_block as usize * self.block_multiplier as usize
    }

    /// Reject geometry the engine cannot stream with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate.hz() == 0 {
            return Err(AudioError::InvalidConfiguration(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.input_channels.count() == 0 || self.output_channels.count() == 0 {
            return Err(AudioError::InvalidConfiguration(
                "channel counts must be positive".to_string(),
            ));
        }
        if self.frames_per_block == 0 {
            return Err(AudioError::InvalidConfiguration(
                "frames per block must be positive".to_string(),
            ));
        }
        if self.block_multiplier < 2 {
            return Err(AudioError::InvalidConfiguration(format!(
                "block multiplier must be at least 2, got {}",
                self.block_multiplier
            )));
        }
        Ok(())
    }
}

/// Type of audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
    Duplex,
}

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub sample_rates: Vec<SampleRate>,
    pub channel_counts: Vec<ChannelCount>,
    pub default_sample_rate: Option<SampleRate>,
}

/// Lists the devices a host can stream from or to
pub trait AudioEnumerator: Send + Sync {
    fn devices(&self) -> Result<Vec<DeviceInfo>>;
}
