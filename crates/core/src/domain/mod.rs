//! Domain entities and signal-processing rules

pub mod audio;
pub mod codec;
pub mod config;
pub mod device;
pub mod dsp;
pub mod effects;
pub mod params;
pub mod processor;
pub mod state;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioEnumerator, AudioError, ChannelCount, DeviceId, DeviceInfo, DeviceType,
    SampleFormat, SampleRate, StreamConfig, DEFAULT_DEVICE,
};
pub use codec::WireSample;
pub use config::{
    AppConfig, ConfigError, ConfigManager, ConfigWatcher, PresetManager, StompConfig,
};
pub use device::{CaptureDevice, Direction, IoStatus, PlaybackDevice};
pub use effects::{EffectKind, UnknownEffect};
pub use params::{
    BitcrushParams, DelayParams, DriveParams, FuzzParams, ParameterStore, Parameters,
    ReverbParams, TremoloParams, UnknownParameter, PARAMETER_NAMES,
};
pub use processor::BlockProcessor;
pub use state::EffectState;
