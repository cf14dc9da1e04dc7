//! Digital signal processing building blocks
//!
//! The stateful primitives every effect is assembled from:
//! - Fixed-capacity delay line with a runtime-adjustable length
//! - Multi-tap comb bank for the reverb
//! - Sample-and-hold with a fractional counter plus a bit quantizer
//! - 10-tap FIR tone filter, DC blocker and envelope follower
//! - Sine lookup table for the tremolo oscillator
//!
//! All primitives allocate once at construction. `reset` zeroes state in
//! place, so nothing here allocates on the audio thread.

use std::f32::consts::TAU;

/// Fixed constants shared by the effect algorithms
pub mod consts {
    /// Entries in the tremolo sine table (must be a power of two)
    pub const SINE_TABLE_LEN: usize = 1024;

    /// Longest delay the delay line is sized for
    pub const MAX_DELAY_MS: f32 = 2000.0;

    /// Reverb tap delays and gains
    pub const REVERB_TAP_MS: [f32; 5] = [40.0, 50.0, 60.0, 80.0, 110.0];
    pub const REVERB_TAP_GAINS: [f32; 5] = [0.6, 0.5, 0.4, 0.3, 0.25];

    /// Lowpass taps for the tone stage, summing to unity gain
    pub const TONE_FIR: [f32; 10] = [0.02, 0.05, 0.09, 0.13, 0.21, 0.21, 0.13, 0.09, 0.05, 0.02];

    /// Pole of the DC blocking filter
    pub const DC_POLE: f32 = 0.995;

    /// Share of the DC-blocked signal in the fuzz output
    pub const DC_MIX: f32 = 0.9;

    /// Envelope follower input gain (peak of a unit-RMS sine)
    pub const ENVELOPE_GAIN: f32 = 1.414;

    /// Drive scaling per distortion-family effect
    pub const OVERDRIVE_FACTOR: f32 = 10.0;
    pub const DISTORTION_FACTOR: f32 = 20.0;
    pub const FUZZ_FACTOR: f32 = 50.0;
}

/// Linear dry/wet blend
#[inline]
pub fn blend(dry: f32, wet: f32, mix: f32) -> f32 {
    (1.0 - mix) * dry + mix * wet
}

// ============================================================================
// DELAY LINE
// ============================================================================

/// Circular delay buffer
///
/// The backing storage is allocated for the longest supported delay. The
/// active length can change while running; the read/write index is wrapped
/// into the new length instead of reallocating.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    len: usize,
    index: usize,
}

impl DelayLine {
    /// Create a delay line able to hold `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            len: capacity,
            index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Change the active length, bounded to `[1, capacity]`
    ///
    /// Slots uncovered by growing were last written under an older length
    /// and are silenced.
    pub fn set_len(&mut self, len: usize) {
        let len = len.clamp(1, self.buffer.len());
        if len != self.len {
            if len > self.len {
                self.buffer[self.len..len].fill(0.0);
            }
            self.len = len;
            self.index %= len;
        }
    }

    /// Sample written `len` steps ago
    #[inline]
    pub fn read(&self) -> f32 {
        self.buffer[self.index]
    }

    /// Overwrite the current slot and step forward
    #[inline]
    pub fn write_and_advance(&mut self, value: f32) {
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % self.len;
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

// ============================================================================
// COMB BANK (reverb taps)
// ============================================================================

/// Parallel feedback combs sharing one backing buffer
///
/// Each tap owns a segment of `segment_len` samples. Taps read at their own
/// delay behind a shared write index and feed back only their own output.
#[derive(Debug, Clone)]
pub struct CombBank {
    buffer: Vec<f32>,
    segment_len: usize,
    delays: [usize; consts::REVERB_TAP_MS.len()],
    write: usize,
}

impl CombBank {
    /// One segment of `sample_rate` samples per tap
    pub fn new(sample_rate: u32) -> Self {
        let segment_len = (sample_rate as usize).max(2);
        let mut delays = [1; consts::REVERB_TAP_MS.len()];
        for (delay, ms) in delays.iter_mut().zip(consts::REVERB_TAP_MS) {
            let samples = (sample_rate as f32 * ms / 1000.0) as usize;
            *delay = samples.clamp(1, segment_len - 1);
        }
        Self {
            buffer: vec![0.0; segment_len * delays.len()],
            segment_len,
            delays,
            write: 0,
        }
    }

    /// Tap delays in samples
    pub fn delays(&self) -> &[usize] {
        &self.delays
    }

    /// Run one sample through every tap, returning the gain-weighted sum
    #[inline]
    pub fn process(&mut self, input: f32, decay: f32) -> f32 {
        let size = self.segment_len;
        let mut wet = 0.0;
        for (tap, (&delay, gain)) in self.delays.iter().zip(consts::REVERB_TAP_GAINS).enumerate() {
            let base = tap * size;
            let delayed = self.buffer[base + (self.write + size - delay) % size];
            wet += delayed * gain;
            self.buffer[base + self.write] = input + decay * delayed;
        }
        self.write = (self.write + 1) % size;
        wet
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

// ============================================================================
// SAMPLE AND HOLD / QUANTIZER (bitcrush)
// ============================================================================

/// Sample-and-hold driven by a fractional counter
#[derive(Debug, Clone, Default)]
pub struct SampleHold {
    counter: f32,
    held: f32,
}

impl SampleHold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a new input every `ratio` output samples (`ratio >= 1`)
    #[inline]
    pub fn process(&mut self, input: f32, ratio: f32) -> f32 {
        if self.counter <= 0.0 {
            self.held = input;
            self.counter += ratio;
        }
        self.counter -= 1.0;
        self.held
    }

    pub fn reset(&mut self) {
        self.counter = 0.0;
        self.held = 0.0;
    }
}

/// Round to the nearest multiple of `1 / 2^bits`
#[inline]
pub fn quantize(value: f32, bits: u32) -> f32 {
    let step = 1.0 / (1u32 << bits.min(24)) as f32;
    (value / step).round() * step
}

// ============================================================================
// TONE FILTER
// ============================================================================

/// 10-tap FIR lowpass blended with its input
#[derive(Debug, Clone, Default)]
pub struct ToneFilter {
    history: [f32; consts::TONE_FIR.len()],
    pos: usize,
}

impl ToneFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn fir(&mut self, input: f32) -> f32 {
        let taps = self.history.len();
        self.history[self.pos] = input;
        let mut acc = 0.0;
        for (k, coeff) in consts::TONE_FIR.iter().enumerate() {
            acc += coeff * self.history[(self.pos + taps - k) % taps];
        }
        self.pos = (self.pos + 1) % taps;
        acc
    }

    /// `tone = 0` is fully filtered, `tone = 1` bypasses the lowpass
    #[inline]
    pub fn process(&mut self, input: f32, tone: f32) -> f32 {
        (1.0 - tone) * self.fir(input) + tone * input
    }

    pub fn reset(&mut self) {
        self.history = [0.0; consts::TONE_FIR.len()];
        self.pos = 0;
    }
}

// ============================================================================
// DC BLOCKER
// ============================================================================

/// First-order highpass: `y[n] = x[n] - x[n-1] + R * y[n-1]`
#[derive(Debug, Clone, Default)]
pub struct DcBlocker {
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let y = input - self.x1 + consts::DC_POLE * self.y1;
        self.x1 = input;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

// ============================================================================
// ENVELOPE FOLLOWER
// ============================================================================

/// One-pole level tracker with a time constant in milliseconds
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    level: f32,
    attack_ms: f32,
    coeff: f32,
    sample_rate: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: u32, attack_ms: f32) -> Self {
        let mut follower = Self {
            level: 0.0,
            attack_ms: 0.0,
            coeff: 1.0,
            sample_rate: sample_rate as f32,
        };
        follower.set_attack_ms(attack_ms);
        follower
    }

    /// Recompute the smoothing coefficient when the time constant changes
    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        if attack_ms == self.attack_ms {
            return;
        }
        self.attack_ms = attack_ms;
        let samples = (attack_ms * self.sample_rate / 1000.0).max(1.0);
        self.coeff = 1.0 - (-1.0 / samples).exp();
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let target = (consts::ENVELOPE_GAIN * input.abs()).min(1.0);
        self.level += self.coeff * (target - self.level);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

// ============================================================================
// SINE TABLE
// ============================================================================

/// Read-only sine lookup indexed by phase in radians
#[derive(Debug, Clone)]
pub struct SineTable {
    table: Box<[f32]>,
}

impl SineTable {
    pub fn new() -> Self {
        let len = consts::SINE_TABLE_LEN;
        let table = (0..len)
            .map(|i| (TAU * i as f32 / len as f32).sin())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { table }
    }

    #[inline]
    pub fn lookup(&self, phase: f32) -> f32 {
        let len = self.table.len();
        let index = (phase * len as f32 / TAU) as usize & (len - 1);
        self.table[index]
    }
}

impl Default for SineTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WAVESHAPERS
// ============================================================================

/// Soft clipper `x (k + 1) / (k + |x|)` with `k = 1 / (factor * drive + 0.01)`
#[inline]
pub fn soft_clip(x: f32, drive: f32, factor: f32) -> f32 {
    let k = 1.0 / (factor * drive + 0.01);
    x * (k + 1.0) / (k + x.abs())
}

/// Linear gain into a hard clip
#[inline]
pub fn hard_clip(x: f32, drive: f32, factor: f32) -> f32 {
    (x * (1.0 + (factor - 1.0) * drive)).clamp(-1.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================
