//! Per-effect runtime state
//!
//! One record per effect variant, allocated once for the engine's sample
//! rate. The bank is moved into the audio thread for a streaming session
//! and handed back when the session ends.

use crate::domain::dsp::{
    consts, CombBank, DcBlocker, DelayLine, EnvelopeFollower, SampleHold, SineTable, ToneFilter,
};
use crate::domain::effects::EffectKind;
use crate::domain::params::FuzzParams;

/// Tremolo oscillator
#[derive(Debug, Clone)]
pub struct TremoloState {
    pub table: SineTable,
    /// Oscillator phase in radians, kept in `[0, 2π)`
    pub phase: f32,
}

/// Fuzz chain: tone stage, DC blocker and the bias envelope
#[derive(Debug, Clone)]
pub struct FuzzState {
    pub tone: ToneFilter,
    pub dc: DcBlocker,
    pub envelope: EnvelopeFollower,
}

#[derive(Debug, Clone)]
pub struct EffectState {
    sample_rate: u32,
    pub tremolo: TremoloState,
    pub delay: DelayLine,
    pub reverb: CombBank,
    pub bitcrush: SampleHold,
    pub overdrive: ToneFilter,
    pub distortion: ToneFilter,
    pub fuzz: FuzzState,
}

impl EffectState {
    pub fn new(sample_rate: u32) -> Self {
        let delay_capacity = (sample_rate as f32 * consts::MAX_DELAY_MS / 1000.0) as usize;
        Self {
            sample_rate,
            tremolo: TremoloState {
                table: SineTable::new(),
                phase: 0.0,
            },
            delay: DelayLine::new(delay_capacity),
            reverb: CombBank::new(sample_rate),
            bitcrush: SampleHold::new(),
            overdrive: ToneFilter::new(),
            distortion: ToneFilter::new(),
            fuzz: FuzzState {
                tone: ToneFilter::new(),
                dc: DcBlocker::new(),
                envelope: EnvelopeFollower::new(sample_rate, FuzzParams::default().attack_ms),
            },
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Zero every buffer, index and counter without reallocating
    pub fn reset(&mut self) {
        for kind in EffectKind::ALL {
            self.reset_kind(kind);
        }
    }

    /// Clear only the state owned by `kind`
    pub fn reset_kind(&mut self, kind: EffectKind) {
        match kind {
            EffectKind::Passthrough => {}
            EffectKind::Tremolo => self.tremolo.phase = 0.0,
            EffectKind::Delay => self.delay.reset(),
            EffectKind::Reverb => self.reverb.reset(),
            EffectKind::Bitcrush => self.bitcrush.reset(),
            EffectKind::Overdrive => self.overdrive.reset(),
            EffectKind::Distortion => self.distortion.reset(),
            EffectKind::Fuzz => {
                self.fuzz.tone.reset();
                self.fuzz.dc.reset();
                self.fuzz.envelope.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::effects;
    use crate::domain::params::Parameters;

    const SAMPLE_RATE: u32 = 48000;

    fn run(state: &mut EffectState, kind: EffectKind, input: &[f32]) -> Vec<f32> {
        let params = Parameters::default();
        input
            .iter()
            .map(|&x| effects::process(x, kind, &params, state))
            .collect()
    }

    fn signal(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i * 37 % 200) as f32 / 100.0) - 1.0).collect()
    }

    #[test]
    fn test_delay_capacity_covers_max_delay() {
        let state = EffectState::new(SAMPLE_RATE);
        assert_eq!(state.delay.capacity(), 96000);
    }

    #[test]
    fn test_reset_restores_fresh_behavior() {
        let input = signal(4096);
        for kind in EffectKind::ALL {
            let mut fresh = EffectState::new(SAMPLE_RATE);
            let expected = run(&mut fresh, kind, &input);

            let mut used = EffectState::new(SAMPLE_RATE);
            run(&mut used, kind, &signal(3000));
            used.reset();
            assert_eq!(run(&mut used, kind, &input), expected, "{kind}");
        }
    }

    #[test]
    fn test_reset_is_idempotent() {
        let input = signal(2048);
        let mut once = EffectState::new(SAMPLE_RATE);
        let mut twice = EffectState::new(SAMPLE_RATE);
        for kind in EffectKind::ALL {
            run(&mut once, kind, &input);
            run(&mut twice, kind, &input);
        }
        once.reset();
        twice.reset();
        twice.reset();

        for kind in EffectKind::ALL {
            assert_eq!(run(&mut once, kind, &input), run(&mut twice, kind, &input));
        }
    }

    #[test]
    fn test_reset_kind_leaves_others() {
        let mut state = EffectState::new(SAMPLE_RATE);
        run(&mut state, EffectKind::Tremolo, &signal(100));
        run(&mut state, EffectKind::Delay, &signal(100));

        state.reset_kind(EffectKind::Delay);
        assert_eq!(state.delay.index(), 0);
        assert!(state.tremolo.phase > 0.0);
    }
}
