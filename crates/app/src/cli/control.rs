//! Pedal control surface: two pots, a rotary encoder and its push button

use std::str::FromStr;
use std::time::{Duration, Instant};
use stomp_core::domain::{EffectKind, ParameterStore};
use tracing::debug;

/// Presses closer together than this are contact bounce
pub const PRESS_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Knob {
    Mix,
    Volume,
}

impl FromStr for Knob {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mix" => Ok(Knob::Mix),
            "volume" | "vol" => Ok(Knob::Volume),
            other => Err(format!("unknown knob '{}' (mix, volume)", other)),
        }
    }
}

/// Pots are wired inverted: fully clockwise reads 0
pub fn pot_level(raw: u8) -> f32 {
    f32::from(255 - raw) / 255.0
}

/// Control-surface state owned by the CLI
#[derive(Debug)]
pub struct ControlState {
    /// Effect restored when bypass is released
    last_effect: EffectKind,
    last_press: Option<Instant>,
}

impl ControlState {
    pub fn new(initial: EffectKind) -> Self {
        let last_effect = match initial {
            EffectKind::Passthrough => initial.cycle(1),
            other => other,
        };
        Self {
            last_effect,
            last_press: None,
        }
    }

    pub fn last_effect(&self) -> EffectKind {
        self.last_effect
    }

    /// Record an explicit selection so bypass returns to it
    pub fn selected(&mut self, kind: EffectKind) {
        if kind != EffectKind::Passthrough {
            self.last_effect = kind;
        }
    }

    pub fn knob(&self, store: &ParameterStore, knob: Knob, raw: u8) -> f32 {
        let level = pot_level(raw);
        match knob {
            Knob::Mix => store.set_mix(level),
            Knob::Volume => store.set_volume(level),
        }
        level
    }

    /// One encoder detent per step; wraps around the effect list
    pub fn turn(&mut self, store: &ParameterStore, steps: i32) -> EffectKind {
        let next = store.active_effect().cycle(steps);
        store.select_effect(next);
        self.selected(next);
        debug!(effect = %next, steps, "Encoder turned");
        next
    }

    /// Toggle bypass. Returns the new effect, or `None` when debounced.
    pub fn press(&mut self, store: &ParameterStore, now: Instant) -> Option<EffectKind> {
        if let Some(last) = self.last_press {
            if now.saturating_duration_since(last) < PRESS_DEBOUNCE {
                debug!("Encoder press debounced");
                return None;
            }
        }
        self.last_press = Some(now);

        let next = match store.active_effect() {
            EffectKind::Passthrough => self.last_effect,
            active => {
                self.last_effect = active;
                EffectKind::Passthrough
            }
        };
        store.select_effect(next);
        Some(next)
    }
}
