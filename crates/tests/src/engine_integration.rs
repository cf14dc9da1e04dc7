//! Integration tests for the streaming engine
//!
//! These drive `AudioEngine` end to end through the in-memory devices:
//! capture feed -> audio thread -> effect -> playback sink.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use stomp_core::domain::{Direction, EffectKind, ParameterStore, SampleFormat, StreamConfig};
use stomp_infra::audio::{memory_capture, memory_playback, CaptureFeed, PlaybackSink};
use stomp_infra::{AudioEngine, EngineEvent, EngineState};

const SAMPLE_RATE: u32 = 48000;
const FRAMES: usize = 256;
const TIMEOUT: Duration = Duration::from_secs(10);

fn mono_f32_config() -> StreamConfig {
    StreamConfig {
        input_channels: 1.into(),
        output_channels: 1.into(),
        sample_rate: SAMPLE_RATE.into(),
        format: SampleFormat::F32,
        frames_per_block: FRAMES as u32,
        ..StreamConfig::default()
    }
}

fn mono_engine() -> (AudioEngine, CaptureFeed<f32>, PlaybackSink<f32>) {
    let (capture, feed) = memory_capture::<f32>(1);
    let (playback, sink) = memory_playback::<f32>(1);
    let engine = AudioEngine::new(&mono_f32_config(), Box::new(capture), Box::new(playback))
        .expect("memory devices match the config");
    (engine, feed, sink)
}

fn recorded_engine() -> (
    AudioEngine,
    CaptureFeed<f32>,
    PlaybackSink<f32>,
    Arc<Mutex<Vec<EngineEvent>>>,
) {
    let (engine, feed, sink) = mono_engine();
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    let engine = engine.with_event_handler(move |event| log.lock().unwrap().push(event));
    (engine, feed, sink, events)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

fn ramp_block(offset: f32) -> Vec<f32> {
    (0..FRAMES).map(|i| offset + i as f32 / 1024.0).collect()
}

// ============================================================================
// SIGNAL PATH
// ============================================================================

#[test]
fn test_delay_impulse_scenario() {
    let (engine, feed, sink) = mono_engine();
    engine.params().update(|p| {
        p.effect = EffectKind::Delay;
        p.mix = 1.0;
        p.volume = 1.0;
        p.delay.delay_ms = 500.0;
        p.delay.feedback = 0.4;
    });

    let blocks = 48000 / FRAMES + 1;
    let mut input = vec![0.0f32; blocks * FRAMES];
    input[0] = 1.0;
    feed.push(&input);

    engine.start().unwrap();
    assert!(sink.wait_for(input.len(), TIMEOUT));
    engine.stop().unwrap();

    let output = sink.take();
    assert_eq!(output.len(), input.len());
    assert!((output[24000] - 1.0).abs() < 1e-4, "first echo: {}", output[24000]);
    assert!((output[48000] - 0.4).abs() < 1e-4, "second echo: {}", output[48000]);

    for (i, &sample) in output.iter().enumerate() {
        if i != 24000 && i != 48000 {
            assert!(sample.abs() < 1e-4, "unexpected energy {} at {}", sample, i);
        }
    }
}

#[test]
fn test_passthrough_preserves_block_order() {
    let (engine, feed, sink) = mono_engine();
    let first = ramp_block(0.0);
    let second = ramp_block(-0.5);
    feed.push(&first);
    feed.push(&second);

    engine.start().unwrap();
    assert!(sink.wait_for(2 * FRAMES, TIMEOUT));
    engine.stop().unwrap();

    let expected: Vec<f32> = first.iter().chain(second.iter()).copied().collect();
    assert_eq!(sink.take(), expected);
}

#[test]
fn test_volume_applies_to_output() {
    let (engine, feed, sink) = mono_engine();
    engine.params().set_volume(0.5);
    feed.push(&vec![0.8f32; FRAMES]);

    engine.start().unwrap();
    assert!(sink.wait_for(FRAMES, TIMEOUT));
    engine.stop().unwrap();

    for sample in sink.take() {
        assert!((sample - 0.4).abs() < 1e-6);
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_start_stop_idempotent() {
    let (engine, _feed, _sink, events) = recorded_engine();
    assert_eq!(engine.state(), EngineState::Stopped);

    engine.stop().unwrap();
    engine.start().unwrap();
    engine.start().unwrap();
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop().unwrap();
    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);

    assert_eq!(
        *events.lock().unwrap(),
        vec![EngineEvent::Started, EngineEvent::Stopped]
    );
}

#[test]
fn test_restart_keeps_streaming() {
    let (engine, feed, sink) = mono_engine();

    engine.start().unwrap();
    engine.stop().unwrap();
    engine.start().unwrap();

    let block = ramp_block(0.1);
    feed.push(&block);
    assert!(sink.wait_for(FRAMES, TIMEOUT));
    engine.stop().unwrap();

    assert_eq!(sink.take(), block);
}

#[test]
fn test_stop_discards_partial_block() {
    let (engine, feed, sink) = mono_engine();
    feed.push(&[0.25f32; FRAMES / 2]);

    engine.start().unwrap();
    // Both devices are primed once as the session starts
    assert!(wait_until(|| feed.prepare_count() == 1 && sink.prepare_count() == 1));

    engine.stop().unwrap();

    assert_eq!(feed.pending(), 0);
    assert!(sink.is_empty());
    assert_eq!(feed.prepare_count(), 2);
    assert_eq!(sink.prepare_count(), 2);
}

#[test]
fn test_stop_from_event_handler() {
    let (engine, feed, _sink) = mono_engine();
    let stopper = engine.stop_handle();
    let stops = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&stops);

    let engine = engine.with_event_handler(move |event| match event {
        EngineEvent::Xrun { .. } => stopper.stop(),
        EngineEvent::Stopped => {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        EngineEvent::Started => {}
    });

    engine.start().unwrap();
    feed.inject_overrun();

    assert!(wait_until(|| !engine.is_running()));
    assert!(wait_until(|| stops.load(Ordering::SeqCst) == 1));

    // Joining a session that already ended on its own
    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
}

// ============================================================================
// XRUN RECOVERY
// ============================================================================

#[test]
fn test_capture_overrun_recovers() {
    let (engine, feed, sink, events) = recorded_engine();
    engine.start().unwrap();

    feed.inject_overrun();
    assert!(wait_until(|| events
        .lock()
        .unwrap()
        .contains(&EngineEvent::Xrun {
            direction: Direction::Capture
        })));

    let block = ramp_block(0.0);
    feed.push(&block);
    assert!(sink.wait_for(FRAMES, TIMEOUT));
    engine.stop().unwrap();

    assert_eq!(sink.take(), block);
}

#[test]
fn test_playback_underrun_drops_block() {
    let (engine, feed, sink, events) = recorded_engine();
    engine.start().unwrap();

    sink.inject_underrun();
    let dropped = ramp_block(0.0);
    let kept = ramp_block(0.5);
    feed.push(&dropped);
    feed.push(&kept);

    assert!(sink.wait_for(FRAMES, TIMEOUT));
    engine.stop().unwrap();

    assert_eq!(sink.take(), kept);
    let xruns = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| **e == EngineEvent::Xrun { direction: Direction::Playback })
        .count();
    assert_eq!(xruns, 1);
}

// ============================================================================
// CONCURRENT CONTROL
// ============================================================================

#[test]
fn test_group_writes_never_tear() {
    const WRITES: usize = 10_000;
    const BLOCKS: usize = 10_000;
    const SMALL: usize = 64;
    const INPUT: f32 = 0.3;

    // Bitcrush at full rate and 1 bit turns 0.3 into 0.5 sample by sample,
    // so the output depends on mix and volume together and nothing else.
    fn published(level: f32) -> f32 {
        let (mix, volume) = (level, 1.0 - level);
        ((1.0 - mix) * INPUT + mix * 0.5) * volume
    }
    let levels: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();

    let config = StreamConfig {
        frames_per_block: SMALL as u32,
        ..mono_f32_config()
    };
    let (capture, feed) = memory_capture::<f32>(1);
    let (playback, sink) = memory_playback::<f32>(1);
    let engine = AudioEngine::new(&config, Box::new(capture), Box::new(playback)).unwrap();
    engine.params().update(|p| {
        p.effect = EffectKind::Bitcrush;
        p.bitcrush.downsample_rate = SAMPLE_RATE as f32;
        p.bitcrush.bit_depth = 1;
        p.mix = 0.0;
        p.volume = 1.0;
    });
    engine.start().unwrap();

    let store: Arc<ParameterStore> = Arc::clone(engine.params());
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..WRITES {
                let level = (i % 1000) as f32 / 1000.0;
                store.update(|p| {
                    p.mix = level;
                    p.volume = 1.0 - level;
                });
            }
        })
    };
    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..WRITES {
                let p = store.snapshot();
                assert_eq!(p.volume, 1.0 - p.mix);
            }
        })
    };

    let block = vec![INPUT; SMALL];
    for _ in 0..BLOCKS {
        feed.push(&block);
    }

    writer.join().unwrap();
    reader.join().unwrap();
    assert!(sink.wait_for(BLOCKS * SMALL, Duration::from_secs(30)));
    engine.stop().unwrap();

    let output = sink.take();
    assert_eq!(output.len(), BLOCKS * SMALL);
    for (n, block) in output.chunks_exact(SMALL).enumerate() {
        // One snapshot per block
        assert!(block.iter().all(|&s| s == block[0]), "block {n} changed mid-block");
        // ...and that snapshot is a single group write
        assert!(
            levels.iter().any(|&l| (published(l) - block[0]).abs() < 1e-6),
            "block {n} mixes two writes: {}",
            block[0]
        );
    }
}
