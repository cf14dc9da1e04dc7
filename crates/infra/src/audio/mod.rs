//! Audio backends and the real-time engine
//!
//! cpal provides the hardware streams on every platform:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio
//!
//! `memory` offers the same device traits without hardware.

pub mod cpal_backend;
pub mod engine;
pub mod memory;
pub mod stream;

pub use cpal_backend::*;
pub use engine::*;
pub use memory::*;
pub use stream::*;
