//! Configuration files feeding a live engine

use std::time::Duration;
use stomp_core::domain::{ConfigManager, EffectKind, PresetManager, SampleFormat, StompConfig};
use stomp_infra::audio::{memory_capture, memory_playback};
use stomp_infra::AudioEngine;
use tempfile::TempDir;

const CONFIG: &str = r#"
[app]
preset_dir = "presets"

[engine]
device = "default"
input_channels = 1
output_channels = 1
sample_rate = 48000
format = "f32"
frames_per_block = 128
block_multiplier = 2

[parameters]
effect = "bitcrush"
mix = 1.0
volume = 1.0

[parameters.bitcrush]
downsample_rate = 24000.0
bit_depth = 16
"#;

#[tokio::test]
async fn test_config_file_drives_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, CONFIG).await.unwrap();

    let config = ConfigManager::with_path(path).load().await;
    assert_eq!(config.engine.format, SampleFormat::F32);
    assert_eq!(config.parameters.effect, EffectKind::Bitcrush);

    let channels = config.engine.input_channels.count();
    let (capture, feed) = memory_capture::<f32>(channels);
    let (playback, sink) = memory_playback::<f32>(channels);
    let engine = AudioEngine::new(&config.engine, Box::new(capture), Box::new(playback)).unwrap();
    engine.params().replace(config.parameters);

    let block: Vec<f32> = (0..128).map(|i| i as f32 / 256.0).collect();
    feed.push(&block);
    engine.start().unwrap();
    assert!(sink.wait_for(block.len(), Duration::from_secs(10)));
    engine.stop().unwrap();

    // Half-rate crush holds every captured sample for two outputs
    let output = sink.take();
    for pair in output.chunks(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

#[tokio::test]
async fn test_preset_round_trip_through_engine() {
    let dir = TempDir::new().unwrap();
    let presets = PresetManager::new(dir.path().join("presets"));

    let (capture, _feed) = memory_capture::<i16>(2);
    let (playback, _sink) = memory_playback::<i16>(2);
    let engine = AudioEngine::new(
        &StompConfig::factory_default().engine,
        Box::new(capture),
        Box::new(playback),
    )
    .unwrap();

    engine.params().update(|p| {
        p.effect = EffectKind::Fuzz;
        p.fuzz.drive = 0.9;
        p.fuzz.attack_ms = 25.0;
    });
    presets.save_preset("lead", &engine.parameters()).await.unwrap();

    engine.select_effect(EffectKind::Passthrough);
    let loaded = presets.load_preset("lead").await.unwrap();
    engine.params().replace(loaded);

    let params = engine.parameters();
    assert_eq!(params.effect, EffectKind::Fuzz);
    assert_eq!(params.fuzz.drive, 0.9);
    assert_eq!(params.fuzz.attack_ms, 25.0);
    assert_eq!(presets.list_presets().await.unwrap(), vec!["lead".to_string()]);
}
