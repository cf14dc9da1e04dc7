//! Stomp infrastructure: device backends and the streaming engine

pub mod audio;

pub use audio::{AudioEngine, EngineEvent, EngineState, StopHandle};
