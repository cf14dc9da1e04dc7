//! The eight selectable effects
//!
//! `process` is the per-sample transform the engine runs on the audio
//! thread. It dispatches on [`EffectKind`] and touches only the selected
//! effect's slot in the [`EffectState`] bank. Every output is clamped to
//! `[-1.0, 1.0]`.

use crate::domain::dsp::{self, consts};
use crate::domain::params::Parameters;
use crate::domain::state::EffectState;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown effect: {0}")]
pub struct UnknownEffect(pub String);

/// Which effect the engine applies; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    #[default]
    Passthrough,
    Tremolo,
    Delay,
    Reverb,
    Bitcrush,
    Overdrive,
    Distortion,
    Fuzz,
}

impl EffectKind {
    pub const ALL: [EffectKind; 8] = [
        EffectKind::Passthrough,
        EffectKind::Tremolo,
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::Bitcrush,
        EffectKind::Overdrive,
        EffectKind::Distortion,
        EffectKind::Fuzz,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Passthrough => "passthrough",
            EffectKind::Tremolo => "tremolo",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
            EffectKind::Bitcrush => "bitcrush",
            EffectKind::Overdrive => "overdrive",
            EffectKind::Distortion => "distortion",
            EffectKind::Fuzz => "fuzz",
        }
    }

    /// Position in [`EffectKind::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Step through the effect list, wrapping at both ends
    pub fn cycle(self, steps: i32) -> Self {
        let len = Self::ALL.len() as i32;
        let next = (self.index() as i32 + steps).rem_euclid(len);
        Self::ALL[next as usize]
    }

    /// Tremolo and passthrough have no dry/wet stage
    pub fn uses_mix(&self) -> bool {
        !matches!(self, EffectKind::Passthrough | EffectKind::Tremolo)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "none" | "clean" | "bypass" => "passthrough",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| UnknownEffect(s.to_string()))
    }
}

/// Run one normalized sample through `kind`
#[inline]
pub fn process(input: f32, kind: EffectKind, params: &Parameters, state: &mut EffectState) -> f32 {
    let sample_rate = state.sample_rate() as f32;
    let output = match kind {
        EffectKind::Passthrough => input,
        EffectKind::Tremolo => tremolo(input, params, state, sample_rate),
        EffectKind::Delay => {
            let len = (sample_rate * params.delay.delay_ms / 1000.0) as usize;
            state.delay.set_len(len.max(1));
            let delayed = state.delay.read();
            state
                .delay
                .write_and_advance(input + delayed * params.delay.feedback);
            dsp::blend(input, delayed, params.mix)
        }
        EffectKind::Reverb => {
            let wet = state.reverb.process(input, params.reverb.decay);
            dsp::blend(input, wet, params.mix)
        }
        EffectKind::Bitcrush => {
            let ratio = sample_rate / params.bitcrush.downsample_rate.max(1.0);
            let held = state.bitcrush.process(input, ratio.max(1.0));
            let crushed = dsp::quantize(held, params.bitcrush.bit_depth).clamp(-1.0, 1.0);
            dsp::blend(input, crushed, params.mix)
        }
        EffectKind::Overdrive => {
            let drive = params.overdrive;
            let shaped = dsp::soft_clip(input, drive.drive, consts::OVERDRIVE_FACTOR);
            let wet = state.overdrive.process(shaped, drive.tone).clamp(-1.0, 1.0);
            dsp::blend(input, wet, params.mix)
        }
        EffectKind::Distortion => {
            let drive = params.distortion;
            let shaped = dsp::hard_clip(input, drive.drive, consts::DISTORTION_FACTOR);
            let wet = state.distortion.process(shaped, drive.tone).clamp(-1.0, 1.0);
            dsp::blend(input, wet, params.mix)
        }
        EffectKind::Fuzz => fuzz(input, params, state),
    };
    output.clamp(-1.0, 1.0)
}

#[inline]
fn tremolo(input: f32, params: &Parameters, state: &mut EffectState, sample_rate: f32) -> f32 {
    let osc = &mut state.tremolo;
    let depth = params.tremolo.depth;
    let lfo = osc.table.lookup(osc.phase);
    let gain = (1.0 - depth) + depth * 0.5 * (1.0 + lfo);

    osc.phase += TAU * params.tremolo.freq / sample_rate;
    if osc.phase >= TAU {
        osc.phase -= TAU;
    }
    input * gain
}

#[inline]
fn fuzz(input: f32, params: &Parameters, state: &mut EffectState) -> f32 {
    let fuzz = params.fuzz;
    let chain = &mut state.fuzz;

    chain.envelope.set_attack_ms(fuzz.attack_ms);
    let env = chain.envelope.process(input);
    let bias = fuzz.max_bias * fuzz.drive * env;

    let shaped = dsp::soft_clip(input + bias, fuzz.drive, consts::FUZZ_FACTOR);
    let toned = chain.tone.process(shaped, fuzz.tone);
    let blocked = chain.dc.process(toned);
    let wet = dsp::blend(toned, blocked, consts::DC_MIX).clamp(-1.0, 1.0);
    dsp::blend(input, wet, params.mix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::ParameterStore;
    use proptest::prelude::*;

    const SAMPLE_RATE: u32 = 48000;

    fn sine(len: usize, freq: f32, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (TAU * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn run(kind: EffectKind, params: &Parameters, input: &[f32]) -> Vec<f32> {
        let mut state = EffectState::new(SAMPLE_RATE);
        input
            .iter()
            .map(|&x| process(x, kind, params, &mut state))
            .collect()
    }

    // -------------------------------------------------------------------------
    // EffectKind Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_effect_kind_parse_and_display() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.to_string().parse::<EffectKind>().unwrap(), kind);
        }
        assert_eq!("Clean".parse::<EffectKind>().unwrap(), EffectKind::Passthrough);
        assert!("wah".parse::<EffectKind>().is_err());
    }

    #[test]
    fn test_effect_kind_cycle_wraps() {
        assert_eq!(EffectKind::Fuzz.cycle(1), EffectKind::Passthrough);
        assert_eq!(EffectKind::Passthrough.cycle(-1), EffectKind::Fuzz);
        assert_eq!(EffectKind::Delay.cycle(2), EffectKind::Bitcrush);
        assert_eq!(EffectKind::from_index(8), None);
    }

    // -------------------------------------------------------------------------
    // Mix Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_passthrough_is_identity() {
        let input = sine(512, 440.0, 0.9);
        let mut params = Parameters::default();
        params.mix = 0.0;
        assert_eq!(run(EffectKind::Passthrough, &params, &input), input);
        params.mix = 1.0;
        assert_eq!(run(EffectKind::Passthrough, &params, &input), input);
    }

    #[test]
    fn test_zero_mix_is_dry() {
        let input = sine(4096, 220.0, 0.8);
        let mut params = Parameters::default();
        params.mix = 0.0;

        for kind in EffectKind::ALL.into_iter().filter(EffectKind::uses_mix) {
            assert_eq!(run(kind, &params, &input), input, "{kind}");
        }
    }

    #[test]
    fn test_tremolo_ignores_mix() {
        let input = sine(1024, 440.0, 0.5);
        let mut params = Parameters::default();
        params.mix = 0.0;
        let dry = run(EffectKind::Tremolo, &params, &input);
        params.mix = 1.0;
        assert_eq!(run(EffectKind::Tremolo, &params, &input), dry);
    }

    // -------------------------------------------------------------------------
    // Effect Behavior Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_tremolo_depth_zero_is_identity() {
        let input = sine(2048, 330.0, 0.7);
        let mut params = Parameters::default();
        params.tremolo.depth = 0.0;
        for freq in [0.1, 4.0, 20.0] {
            params.tremolo.freq = freq;
            assert_eq!(run(EffectKind::Tremolo, &params, &input), input);
        }
    }

    #[test]
    fn test_tremolo_full_depth_modulates() {
        let input = vec![1.0; SAMPLE_RATE as usize / 4];
        let mut params = Parameters::default();
        params.tremolo.depth = 1.0;
        params.tremolo.freq = 4.0;
        let out = run(EffectKind::Tremolo, &params, &input);

        let min = out.iter().cloned().fold(f32::MAX, f32::min);
        let max = out.iter().cloned().fold(f32::MIN, f32::max);
        assert!(min < 0.01);
        assert!(max > 0.99);
    }

    #[test]
    fn test_delay_impulse_echoes() {
        let mut params = Parameters::default();
        params.mix = 1.0;
        params.delay.delay_ms = 10.0;
        params.delay.feedback = 0.5;
        let delay_samples = 480;

        let mut input = vec![0.0; delay_samples * 4 + 1];
        input[0] = 1.0;
        let out = run(EffectKind::Delay, &params, &input);

        for (n, &s) in out.iter().enumerate() {
            let expected = match n % delay_samples {
                0 if n > 0 => 0.5f32.powi((n / delay_samples) as i32 - 1),
                _ => 0.0,
            };
            assert!((s - expected).abs() < 1e-6, "sample {n}: {s} != {expected}");
        }
    }

    #[test]
    fn test_delay_length_change_keeps_running() {
        let mut params = Parameters::default();
        let mut state = EffectState::new(SAMPLE_RATE);
        for _ in 0..30000 {
            process(0.3, EffectKind::Delay, &params, &mut state);
        }
        params.delay.delay_ms = 100.0;
        let out = process(0.3, EffectKind::Delay, &params, &mut state);
        assert!(out.is_finite());
        assert_eq!(state.delay.len(), 4800);
        assert_eq!(state.delay.capacity(), 96000);
    }

    #[test]
    fn test_bitcrush_full_rate_only_quantizes() {
        let input = sine(256, 1000.0, 0.9);
        let mut params = Parameters::default();
        params.mix = 1.0;
        params.bitcrush.downsample_rate = SAMPLE_RATE as f32;
        params.bitcrush.bit_depth = 4;

        let out = run(EffectKind::Bitcrush, &params, &input);
        for (x, y) in input.iter().zip(&out) {
            assert_eq!(*y, dsp::quantize(*x, 4));
        }
    }

    #[test]
    fn test_bitcrush_half_rate_holds_two() {
        let input: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();
        let mut params = Parameters::default();
        params.mix = 1.0;
        params.bitcrush.downsample_rate = SAMPLE_RATE as f32 / 2.0;
        params.bitcrush.bit_depth = 16;

        let out = run(EffectKind::Bitcrush, &params, &input);
        for pair in out.chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
        assert_eq!(out[2], dsp::quantize(input[2], 16));
    }

    #[test]
    fn test_distortion_family_adds_gain() {
        let input = sine(2048, 200.0, 0.2);
        let mut params = Parameters::default();
        params.mix = 1.0;
        let in_peak = input.iter().fold(0.0f32, |m, s| m.max(s.abs()));

        for kind in [EffectKind::Overdrive, EffectKind::Distortion, EffectKind::Fuzz] {
            let out = run(kind, &params, &input);
            let out_peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(out_peak > in_peak, "{kind}: {out_peak} <= {in_peak}");
        }
    }

    #[test]
    fn test_distortion_states_are_independent() {
        let input = sine(512, 300.0, 0.6);
        let params = Parameters::default();
        let reference = run(EffectKind::Overdrive, &params, &input);

        let mut state = EffectState::new(SAMPLE_RATE);
        for &x in &input {
            process(x, EffectKind::Distortion, &params, &mut state);
        }
        let out: Vec<f32> = input
            .iter()
            .map(|&x| process(x, EffectKind::Overdrive, &params, &mut state))
            .collect();
        assert_eq!(out, reference);
    }

    #[test]
    fn test_reverb_tail_decays() {
        let mut params = Parameters::default();
        params.mix = 1.0;
        let mut input = vec![0.0; SAMPLE_RATE as usize * 2];
        input[0] = 1.0;
        let out = run(EffectKind::Reverb, &params, &input);

        let early = out[..SAMPLE_RATE as usize / 2].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let late = out[SAMPLE_RATE as usize * 3 / 2..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(early > 0.5);
        assert!(late < early * 0.1);
    }

    proptest! {
        #[test]
        fn prop_output_stays_in_range(
            input in proptest::collection::vec(-1.0f32..=1.0, 1..256),
            kind_index in 0usize..8,
            mix in 0.0f32..=1.0,
            drive in 0.0f32..=1.0,
            tone in 0.0f32..=1.0,
            feedback in 0.0f32..=0.99,
            decay in 0.0f32..=0.95,
            bits in 1u32..=16,
        ) {
            let kind = EffectKind::ALL[kind_index];
            let store = ParameterStore::new(SAMPLE_RATE);
            let params = store.update(|p| {
                p.mix = mix;
                p.delay.feedback = feedback;
                p.delay.delay_ms = 1.0;
                p.reverb.decay = decay;
                p.bitcrush.bit_depth = bits;
                p.overdrive.drive = drive;
                p.overdrive.tone = tone;
                p.distortion.drive = drive;
                p.distortion.tone = tone;
                p.fuzz.drive = drive;
                p.fuzz.tone = tone;
                p.fuzz.max_bias = 0.5;
            });

            let mut state = EffectState::new(SAMPLE_RATE);
            for _ in 0..4 {
                for &x in &input {
                    let y = process(x, kind, &params, &mut state);
                    prop_assert!((-1.0..=1.0).contains(&y), "{kind}: {y}");
                }
            }
        }
    }
}
