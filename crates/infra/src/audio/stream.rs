//! Ring-buffered cpal streams exposed as non-blocking device handles
//!
//! cpal drives capture and playback through callbacks on its own threads.
//! This module bridges them to the engine's pull model: the input callback
//! pushes interleaved samples into an `rtrb` ring and signals readiness,
//! the output callback drains a second ring. Both rings are sized to
//! `frames_per_block * block_multiplier` frames.
//!
//! cpal streams are not `Send` on every platform, so they are built and
//! owned by a dedicated host thread that lives as long as either handle.

use crate::audio::cpal_backend::{check_duplex, find_input_device, find_output_device, CpalDevice};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SizedSample, Stream, StreamConfig as CpalStreamConfig};
use crossbeam::channel::{bounded, Receiver, Sender};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use stomp_core::domain::audio::{AudioError, DeviceType, Result, StreamConfig};
use stomp_core::domain::codec::WireSample;
use stomp_core::domain::device::{CaptureDevice, IoStatus, PlaybackDevice};
use tracing::{debug, error, info};

/// Sample types cpal can stream for us
pub trait CpalSample: WireSample + SizedSample {}

impl<S: WireSample + SizedSample> CpalSample for S {}

#[derive(Debug, Default)]
struct CaptureFlags {
    overrun: AtomicBool,
}

#[derive(Debug, Default)]
struct PlaybackFlags {
    underrun: AtomicBool,
    /// Set once the engine has queued audio; an empty ring before that is not an xrun
    primed: AtomicBool,
    drain: AtomicBool,
}

/// Owns the thread that keeps the cpal streams alive
struct HostThread {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for HostThread {
    fn drop(&mut self) {
        // Disconnecting the channel releases the host thread
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("PCM host thread panicked");
            }
        }
        debug!("PCM streams closed");
    }
}

/// Capture half of a cpal duplex stream
pub struct CpalCapture<S> {
    consumer: Consumer<S>,
    ready: Receiver<()>,
    flags: Arc<CaptureFlags>,
    channels: u16,
    _host: Arc<HostThread>,
}

/// Playback half of a cpal duplex stream
pub struct CpalPlayback<S> {
    producer: Producer<S>,
    flags: Arc<PlaybackFlags>,
    channels: u16,
    _host: Arc<HostThread>,
}

/// Open capture and playback on the configured device
///
/// Fails if the device is missing or cannot stream the requested geometry.
pub fn open_duplex<S: CpalSample>(config: &StreamConfig) -> Result<(CpalCapture<S>, CpalPlayback<S>)> {
    config.validate()?;

    let in_channels = config.input_channels.count();
    let out_channels = config.output_channels.count();
    let (capture_tx, capture_rx) = RingBuffer::<S>::new(config.buffer_frames() * in_channels as usize);
    let (playback_tx, playback_rx) =
        RingBuffer::<S>::new(config.buffer_frames() * out_channels as usize);

    let (ready_tx, ready_rx) = bounded(1);
    let capture_flags = Arc::new(CaptureFlags::default());
    let playback_flags = Arc::new(PlaybackFlags::default());

    let (status_tx, status_rx) = bounded::<Result<()>>(1);
    let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

    let host_config = config.clone();
    let host_capture_flags = Arc::clone(&capture_flags);
    let host_playback_flags = Arc::clone(&playback_flags);

    let handle = thread::Builder::new()
        .name("stomp-pcm".to_string())
        .spawn(move || {
            let streams = build_streams(
                &host_config,
                capture_tx,
                playback_rx,
                ready_tx,
                host_capture_flags,
                host_playback_flags,
            );
            let streams = match streams {
                Ok(streams) => {
                    let _ = status_tx.send(Ok(()));
                    streams
                }
                Err(e) => {
                    let _ = status_tx.send(Err(e));
                    return;
                }
            };

            // Parked until every handle is gone
            let _ = shutdown_rx.recv();
            drop(streams);
        })
        .map_err(|e| AudioError::OsError(format!("Failed to spawn PCM thread: {}", e)))?;

    let host = Arc::new(HostThread {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    });

    match status_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(AudioError::StreamError(
                "PCM thread exited during setup".to_string(),
            ))
        }
    }

    info!(
        device = %config.device,
        rate = config.sample_rate.hz(),
        format = %config.format,
        in_channels,
        out_channels,
        frames = config.frames_per_block,
        "PCM streams running"
    );

    let capture = CpalCapture {
        consumer: capture_rx,
        ready: ready_rx,
        flags: capture_flags,
        channels: in_channels,
        _host: Arc::clone(&host),
    };
    let playback = CpalPlayback {
        producer: playback_tx,
        flags: playback_flags,
        channels: out_channels,
        _host: host,
    };
    Ok((capture, playback))
}

fn build_streams<S: CpalSample>(
    config: &StreamConfig,
    mut capture_tx: Producer<S>,
    mut playback_rx: Consumer<S>,
    ready_tx: Sender<()>,
    capture_flags: Arc<CaptureFlags>,
    playback_flags: Arc<PlaybackFlags>,
) -> Result<(Stream, Stream)> {
    let host = cpal::default_host();
    let input_device = find_input_device(&host, &config.device)?;
    let output_device = find_output_device(&host, &config.device)?;
    check_duplex(
        &CpalDevice::new(&input_device, DeviceType::Input),
        &CpalDevice::new(&output_device, DeviceType::Output),
        config,
    )?;

    let input_config = CpalStreamConfig {
        channels: config.input_channels.count(),
        sample_rate: config.sample_rate.hz(),
        buffer_size: BufferSize::Fixed(config.frames_per_block),
    };
    let output_config = CpalStreamConfig {
        channels: config.output_channels.count(),
        sample_rate: config.sample_rate.hz(),
        buffer_size: BufferSize::Fixed(config.frames_per_block),
    };

    let overrun_flags = Arc::clone(&capture_flags);
    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[S], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    if capture_tx.push(sample).is_err() {
                        capture_flags.overrun.store(true, Ordering::Release);
                        break;
                    }
                }
                // A pending wake already covers this block
                let _ = ready_tx.try_send(());
            },
            move |err| {
                error!("Input stream error: {}", err);
                overrun_flags.overrun.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build input stream: {}", e)))?;

    let underrun_flags = Arc::clone(&playback_flags);
    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
                if playback_flags.drain.swap(false, Ordering::AcqRel) {
                    while playback_rx.pop().is_ok() {}
                }
                let mut starved = false;
                for slot in data.iter_mut() {
                    *slot = match playback_rx.pop() {
                        Ok(sample) => sample,
                        Err(_) => {
                            starved = true;
                            S::default()
                        }
                    };
                }
                if starved && playback_flags.primed.load(Ordering::Acquire) {
                    playback_flags.underrun.store(true, Ordering::Release);
                }
            },
            move |err| {
                error!("Output stream error: {}", err);
                underrun_flags.underrun.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))?;

    output_stream
        .play()
        .map_err(|e| AudioError::StreamError(format!("Failed to start output stream: {}", e)))?;
    input_stream
        .play()
        .map_err(|e| AudioError::StreamError(format!("Failed to start input stream: {}", e)))?;

    Ok((input_stream, output_stream))
}

impl<S: CpalSample> CaptureDevice<S> for CpalCapture<S> {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn readiness(&self) -> Receiver<()> {
        self.ready.clone()
    }

    fn read(&mut self, block: &mut [S]) -> IoStatus {
        if self.flags.overrun.load(Ordering::Acquire) {
            return IoStatus::Xrun;
        }
        if self.consumer.slots() < block.len() {
            return IoStatus::WouldBlock;
        }
        for slot in block.iter_mut() {
            match self.consumer.pop() {
                Ok(sample) => *slot = sample,
                Err(_) => return IoStatus::WouldBlock,
            }
        }
        IoStatus::Frames(block.len() / self.channels as usize)
    }

    fn prepare(&mut self) {
        self.drop_pending();
        self.flags.overrun.store(false, Ordering::Release);
    }

    fn drop_pending(&mut self) {
        while self.consumer.pop().is_ok() {}
    }
}

impl<S: CpalSample> PlaybackDevice<S> for CpalPlayback<S> {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn write(&mut self, block: &[S]) -> IoStatus {
        if self.flags.underrun.load(Ordering::Acquire) {
            return IoStatus::Xrun;
        }
        if self.producer.slots() < block.len() {
            return IoStatus::WouldBlock;
        }
        for &sample in block {
            if self.producer.push(sample).is_err() {
                return IoStatus::WouldBlock;
            }
        }
        self.flags.primed.store(true, Ordering::Release);
        IoStatus::Frames(block.len() / self.channels as usize)
    }

    fn prepare(&mut self) {
        self.drop_pending();
        self.flags.underrun.store(false, Ordering::Release);
    }

    fn drop_pending(&mut self) {
        self.flags.primed.store(false, Ordering::Release);
        self.flags.drain.store(true, Ordering::Release);
    }
}
