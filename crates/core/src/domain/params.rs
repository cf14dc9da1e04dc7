//! Shared effect parameters
//!
//! [`Parameters`] is a plain `Copy` snapshot of every knob plus the active
//! effect. [`ParameterStore`] publishes it through an `AtomicCell`: the
//! audio thread loads one consistent snapshot per block and never takes a
//! lock, while control threads serialize read-modify-write updates on a
//! writer-side mutex. Every write is clamped before it is published.

use crate::domain::effects::EffectKind;
use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::trace;

/// Parameter constraints
///
/// Values outside these ranges are clamped by the store, so the effects
/// never see them.
pub mod ranges {
    pub const MIX_MIN: f32 = 0.0;
    pub const MIX_MAX: f32 = 1.0;

    pub const VOLUME_MIN: f32 = 0.0;
    pub const VOLUME_MAX: f32 = 1.0;

    /// Tremolo rate (Hz)
    pub const TREM_FREQ_MIN: f32 = 0.1;
    pub const TREM_FREQ_MAX: f32 = 20.0;

    pub const DELAY_MS_MIN: f32 = 1.0;
    pub const DELAY_MS_MAX: f32 = 2000.0;

    pub const FEEDBACK_MAX: f32 = 0.99;
    pub const DECAY_MAX: f32 = 0.95;

    /// Bitcrush downsample floor (Hz); the ceiling is the engine rate
    pub const DOWNSAMPLE_MIN: f32 = 1.0;

    pub const BIT_DEPTH_MIN: u32 = 1;
    pub const BIT_DEPTH_MAX: u32 = 16;

    pub const MAX_BIAS_MAX: f32 = 0.5;

    pub const ATTACK_MS_MIN: f32 = 0.1;
    pub const ATTACK_MS_MAX: f32 = 500.0;
}

/// Clamp, mapping NaN to the lower bound
#[inline]
fn bounded(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TremoloParams {
    /// LFO rate in Hz
    pub freq: f32,
    pub depth: f32,
}

impl Default for TremoloParams {
    fn default() -> Self {
        Self {
            freq: 4.0,
            depth: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayParams {
    pub delay_ms: f32,
    pub feedback: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_ms: 500.0,
            feedback: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    pub decay: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self { decay: 0.6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcrushParams {
    /// Effective sample rate of the hold stage in Hz
    pub downsample_rate: f32,
    pub bit_depth: u32,
}

impl Default for BitcrushParams {
    fn default() -> Self {
        Self {
            downsample_rate: 12000.0,
            bit_depth: 8,
        }
    }
}

/// Overdrive and distortion knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveParams {
    pub drive: f32,
    pub tone: f32,
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            drive: 0.5,
            tone: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzParams {
    pub drive: f32,
    pub tone: f32,
    /// Largest asymmetric bias the envelope can push in
    pub max_bias: f32,
    /// Envelope time constant in milliseconds
    pub attack_ms: f32,
}

impl Default for FuzzParams {
    fn default() -> Self {
        Self {
            drive: 0.5,
            tone: 0.5,
            max_bias: 0.2,
            attack_ms: 10.0,
        }
    }
}

/// Snapshot of every externally adjustable value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub effect: EffectKind,
    /// Dry/wet blend for effects with a wet stage
    pub mix: f32,
    /// Output level applied after the effect
    pub volume: f32,
    pub tremolo: TremoloParams,
    pub delay: DelayParams,
    pub reverb: ReverbParams,
    pub bitcrush: BitcrushParams,
    pub overdrive: DriveParams,
    pub distortion: DriveParams,
    pub fuzz: FuzzParams,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            effect: EffectKind::default(),
            mix: 0.5,
            volume: 1.0,
            tremolo: TremoloParams::default(),
            delay: DelayParams::default(),
            reverb: ReverbParams::default(),
            bitcrush: BitcrushParams::default(),
            overdrive: DriveParams::default(),
            distortion: DriveParams::default(),
            fuzz: FuzzParams::default(),
        }
    }
}

impl Parameters {
    /// Copy with every field forced into its valid range
    #[must_use]
    pub fn clamped(mut self, sample_rate: u32) -> Self {
        use ranges::*;

        self.mix = bounded(self.mix, MIX_MIN, MIX_MAX);
        self.volume = bounded(self.volume, VOLUME_MIN, VOLUME_MAX);

        self.tremolo.freq = bounded(self.tremolo.freq, TREM_FREQ_MIN, TREM_FREQ_MAX);
        self.tremolo.depth = bounded(self.tremolo.depth, 0.0, 1.0);

        self.delay.delay_ms = bounded(self.delay.delay_ms, DELAY_MS_MIN, DELAY_MS_MAX);
        self.delay.feedback = bounded(self.delay.feedback, 0.0, FEEDBACK_MAX);

        self.reverb.decay = bounded(self.reverb.decay, 0.0, DECAY_MAX);

        let ceiling = (sample_rate as f32).max(DOWNSAMPLE_MIN);
        self.bitcrush.downsample_rate =
            bounded(self.bitcrush.downsample_rate, DOWNSAMPLE_MIN, ceiling);
        self.bitcrush.bit_depth = self.bitcrush.bit_depth.clamp(BIT_DEPTH_MIN, BIT_DEPTH_MAX);

        for knobs in [&mut self.overdrive, &mut self.distortion] {
            knobs.drive = bounded(knobs.drive, 0.0, 1.0);
            knobs.tone = bounded(knobs.tone, 0.0, 1.0);
        }

        self.fuzz.drive = bounded(self.fuzz.drive, 0.0, 1.0);
        self.fuzz.tone = bounded(self.fuzz.tone, 0.0, 1.0);
        self.fuzz.max_bias = bounded(self.fuzz.max_bias, 0.0, MAX_BIAS_MAX);
        self.fuzz.attack_ms = bounded(self.fuzz.attack_ms, ATTACK_MS_MIN, ATTACK_MS_MAX);

        self
    }

    /// Current value of a control-surface parameter
    pub fn value_by_name(&self, name: &str) -> Option<f32> {
        let value = match name {
            "mix" => self.mix,
            "volume" => self.volume,
            "trem_freq" => self.tremolo.freq,
            "trem_depth" => self.tremolo.depth,
            "delay_ms" => self.delay.delay_ms,
            "feedback" => self.delay.feedback,
            "reverb_decay" => self.reverb.decay,
            "downsample_rate" => self.bitcrush.downsample_rate,
            "bit_depth" => self.bitcrush.bit_depth as f32,
            "od_drive" => self.overdrive.drive,
            "od_tone" => self.overdrive.tone,
            "dist_drive" => self.distortion.drive,
            "dist_tone" => self.distortion.tone,
            "fuzz_drive" => self.fuzz.drive,
            "fuzz_tone" => self.fuzz.tone,
            "fuzz_bias" => self.fuzz.max_bias,
            "fuzz_attack_ms" => self.fuzz.attack_ms,
            _ => return None,
        };
        Some(value)
    }

    /// Unclamped write of a named parameter; unknown names are ignored
    fn assign(&mut self, name: &str, value: f32) {
        match name {
            "mix" => self.mix = value,
            "volume" => self.volume = value,
            "trem_freq" => self.tremolo.freq = value,
            "trem_depth" => self.tremolo.depth = value,
            "delay_ms" => self.delay.delay_ms = value,
            "feedback" => self.delay.feedback = value,
            "reverb_decay" => self.reverb.decay = value,
            "downsample_rate" => self.bitcrush.downsample_rate = value,
            "bit_depth" => self.bitcrush.bit_depth = value.max(0.0).round() as u32,
            "od_drive" => self.overdrive.drive = value,
            "od_tone" => self.overdrive.tone = value,
            "dist_drive" => self.distortion.drive = value,
            "dist_tone" => self.distortion.tone = value,
            "fuzz_drive" => self.fuzz.drive = value,
            "fuzz_tone" => self.fuzz.tone = value,
            "fuzz_bias" => self.fuzz.max_bias = value,
            "fuzz_attack_ms" => self.fuzz.attack_ms = value,
            _ => {}
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown parameter: {0}")]
pub struct UnknownParameter(pub String);

/// Names accepted by [`ParameterStore::set_by_name`]
pub const PARAMETER_NAMES: &[&str] = &[
    "mix",
    "volume",
    "trem_freq",
    "trem_depth",
    "delay_ms",
    "feedback",
    "reverb_decay",
    "downsample_rate",
    "bit_depth",
    "od_drive",
    "od_tone",
    "dist_drive",
    "dist_tone",
    "fuzz_drive",
    "fuzz_tone",
    "fuzz_bias",
    "fuzz_attack_ms",
];

/// Thread-safe parameter holder shared by the control path and audio thread
#[derive(Debug)]
pub struct ParameterStore {
    current: AtomicCell<Parameters>,
    writer: Mutex<()>,
    sample_rate: u32,
}

impl ParameterStore {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_parameters(sample_rate, Parameters::default())
    }

    pub fn with_parameters(sample_rate: u32, params: Parameters) -> Self {
        Self {
            current: AtomicCell::new(params.clamped(sample_rate)),
            writer: Mutex::new(()),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Consistent copy of every parameter
    #[inline]
    pub fn snapshot(&self) -> Parameters {
        self.current.load()
    }

    /// Apply a group of changes as one write, returning the published value
    pub fn update<F>(&self, change: F) -> Parameters
    where
        F: FnOnce(&mut Parameters),
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = self.current.load();
        change(&mut next);
        let next = next.clamped(self.sample_rate);
        self.current.store(next);
        next
    }

    /// Replace everything, e.g. when loading a preset
    pub fn replace(&self, params: Parameters) -> Parameters {
        self.update(|p| *p = params)
    }

    pub fn active_effect(&self) -> EffectKind {
        self.snapshot().effect
    }

    pub fn select_effect(&self, kind: EffectKind) {
        self.update(|p| p.effect = kind);
        trace!(effect = %kind, "Effect selected");
    }

    pub fn set_mix(&self, mix: f32) {
        self.update(|p| p.mix = mix);
        trace!(mix, "Mix set");
    }

    pub fn set_volume(&self, volume: f32) {
        self.update(|p| p.volume = volume);
        trace!(volume, "Volume set");
    }

    pub fn set_trem_freq(&self, freq: f32) {
        self.update(|p| p.tremolo.freq = freq);
        trace!(freq, "Tremolo rate set");
    }

    pub fn set_trem_depth(&self, depth: f32) {
        self.update(|p| p.tremolo.depth = depth);
        trace!(depth, "Tremolo depth set");
    }

    pub fn set_delay_ms(&self, delay_ms: f32) {
        self.update(|p| p.delay.delay_ms = delay_ms);
        trace!(delay_ms, "Delay time set");
    }

    pub fn set_feedback(&self, feedback: f32) {
        self.update(|p| p.delay.feedback = feedback);
        trace!(feedback, "Delay feedback set");
    }

    pub fn set_reverb_decay(&self, decay: f32) {
        self.update(|p| p.reverb.decay = decay);
        trace!(decay, "Reverb decay set");
    }

    pub fn set_downsample_rate(&self, rate: f32) {
        self.update(|p| p.bitcrush.downsample_rate = rate);
        trace!(rate, "Bitcrush rate set");
    }

    pub fn set_bit_depth(&self, bits: u32) {
        self.update(|p| p.bitcrush.bit_depth = bits);
        trace!(bits, "Bitcrush depth set");
    }

    pub fn set_overdrive_drive(&self, drive: f32) {
        self.update(|p| p.overdrive.drive = drive);
    }

    pub fn set_overdrive_tone(&self, tone: f32) {
        self.update(|p| p.overdrive.tone = tone);
    }

    pub fn set_distortion_drive(&self, drive: f32) {
        self.update(|p| p.distortion.drive = drive);
    }

    pub fn set_distortion_tone(&self, tone: f32) {
        self.update(|p| p.distortion.tone = tone);
    }

    pub fn set_fuzz_drive(&self, drive: f32) {
        self.update(|p| p.fuzz.drive = drive);
    }

    pub fn set_fuzz_tone(&self, tone: f32) {
        self.update(|p| p.fuzz.tone = tone);
    }

    pub fn set_fuzz_max_bias(&self, bias: f32) {
        self.update(|p| p.fuzz.max_bias = bias);
    }

    pub fn set_fuzz_attack_ms(&self, attack_ms: f32) {
        self.update(|p| p.fuzz.attack_ms = attack_ms);
    }

    /// Set one parameter by its control-surface name, returning the
    /// published (clamped) value
    pub fn set_by_name(&self, name: &str, value: f32) -> Result<f32, UnknownParameter> {
        if !PARAMETER_NAMES.contains(&name) {
            return Err(UnknownParameter(name.to_string()));
        }
        let published = self.update(|p| p.assign(name, value));
        published
            .value_by_name(name)
            .ok_or_else(|| UnknownParameter(name.to_string()))
    }
}
