//! Block-level processing: decode, run the active effect, apply the output
//! level, encode.

use crate::domain::codec::{self, WireSample};
use crate::domain::effects::{self, EffectKind};
use crate::domain::params::Parameters;
use crate::domain::state::EffectState;

/// Owns the effect state bank for one streaming session
#[derive(Debug, Clone)]
pub struct BlockProcessor {
    state: EffectState,
    active: Option<EffectKind>,
    input_channels: usize,
    output_channels: usize,
}

impl BlockProcessor {
    pub fn new(sample_rate: u32, input_channels: u16, output_channels: u16) -> Self {
        Self {
            state: EffectState::new(sample_rate),
            active: None,
            input_channels: input_channels.max(1) as usize,
            output_channels: output_channels.max(1) as usize,
        }
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Effect seen on the most recent block
    pub fn active_effect(&self) -> Option<EffectKind> {
        self.active
    }

    pub fn state(&self) -> &EffectState {
        &self.state
    }

    /// Process one interleaved block, returning the number of frames written
    ///
    /// When `params.effect` differs from the previous block, the newly
    /// selected effect starts from cleared state.
    pub fn process_block<S: WireSample>(
        &mut self,
        input: &[S],
        output: &mut [S],
        params: &Parameters,
    ) -> usize {
        let kind = params.effect;
        if self.active != Some(kind) {
            self.state.reset_kind(kind);
            self.active = Some(kind);
        }

        let mut frames = 0;
        for (in_frame, out_frame) in input
            .chunks_exact(self.input_channels)
            .zip(output.chunks_exact_mut(self.output_channels))
        {
            let dry = codec::downmix(in_frame);
            let wet = effects::process(dry, kind, params, &mut self.state);
            codec::fan_out(wet * params.volume, out_frame);
            frames += 1;
        }
        frames
    }

    /// Clear every effect's state for the next session
    pub fn reset(&mut self) {
        self.state.reset();
        self.active = None;
    }
}
