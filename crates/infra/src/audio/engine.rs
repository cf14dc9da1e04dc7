//! Real-time effects engine
//!
//! The engine owns the capture and playback handles, the effect state bank
//! and the audio thread. A streaming session runs `Stopped -> Running ->
//! Stopped`: `start` moves the session (devices, processor, buffers) into a
//! freshly spawned thread and `stop` joins it to take the session back.
//!
//! The audio thread blocks only on the capture readiness channel and the
//! stop channel. Parameters are read through one atomic snapshot per block.

use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{bounded, select, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use stomp_core::domain::audio::{AudioError, Result, SampleFormat, StreamConfig};
use stomp_core::domain::codec::WireSample;
use stomp_core::domain::device::{CaptureDevice, Direction, IoStatus, PlaybackDevice};
use stomp_core::domain::effects::EffectKind;
use stomp_core::domain::params::{ParameterStore, Parameters};
use stomp_core::domain::processor::BlockProcessor;
use tracing::{debug, error, info, trace, warn};

use super::stream::open_duplex;

/// Notifications delivered on the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Started,
    Xrun { direction: Direction },
    Stopped,
}

/// Callback receiving [`EngineEvent`]s; runs on the audio thread
pub type EventHandler = Box<dyn FnMut(EngineEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => f.write_str("stopped"),
            EngineState::Running => f.write_str("running"),
        }
    }
}

/// State shared between the engine, its stop handles and the audio thread
struct Shared {
    running: AtomicBool,
    audio_thread: AtomicCell<Option<ThreadId>>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl Shared {
    fn on_audio_thread(&self) -> bool {
        self.audio_thread.load() == Some(thread::current().id())
    }

    fn request_stop(&self) {
        // A full channel means a stop is already pending
        let _ = self.stop_tx.try_send(());
    }
}

/// Cloneable, non-blocking stop signal for event handlers and other threads
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Ask the running session to end; never joins
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Everything the audio thread owns while streaming
trait Session: Send {
    fn run(&mut self, shared: &Shared, params: &ParameterStore);

    fn set_event_handler(&mut self, handler: EventHandler);
}

struct DuplexSession<S: WireSample> {
    capture: Box<dyn CaptureDevice<S>>,
    playback: Box<dyn PlaybackDevice<S>>,
    processor: BlockProcessor,
    input: Vec<S>,
    output: Vec<S>,
    events: Option<EventHandler>,
}

impl<S: WireSample> DuplexSession<S> {
    fn emit(&mut self, event: EngineEvent) {
        if let Some(handler) = self.events.as_mut() {
            handler(event);
        }
    }

    /// Read every block currently available. Returns false when a stop arrived.
    fn drain_capture(&mut self, shared: &Shared, params: &ParameterStore) -> bool {
        loop {
            if !shared.stop_rx.is_empty() {
                return false;
            }

            match self.capture.read(&mut self.input) {
                IoStatus::WouldBlock => return true,
                IoStatus::Xrun => {
                    warn!("Capture overrun, re-priming input");
                    self.capture.prepare();
                    self.emit(EngineEvent::Xrun {
                        direction: Direction::Capture,
                    });
                }
                IoStatus::Frames(_) => {
                    let snapshot = params.snapshot();
                    self.processor
                        .process_block(&self.input, &mut self.output, &snapshot);

                    match self.playback.write(&self.output) {
                        IoStatus::Frames(_) => {}
                        IoStatus::WouldBlock => trace!("Playback buffer full, block dropped"),
                        IoStatus::Xrun => {
                            warn!("Playback underrun, re-priming output");
                            self.playback.prepare();
                            self.emit(EngineEvent::Xrun {
                                direction: Direction::Playback,
                            });
                        }
                    }
                }
            }
        }
    }
}

impl<S: WireSample> Session for DuplexSession<S> {
    fn run(&mut self, shared: &Shared, params: &ParameterStore) {
        let ready = self.capture.readiness();
        self.capture.prepare();
        self.playback.prepare();
        self.emit(EngineEvent::Started);

        loop {
            select! {
                recv(shared.stop_rx) -> _ => break,
                recv(ready) -> msg => {
                    if msg.is_err() {
                        error!("Capture device disconnected");
                        break;
                    }
                    if !self.drain_capture(shared, params) {
                        break;
                    }
                }
            }
        }

        self.capture.drop_pending();
        self.playback.drop_pending();
        self.capture.prepare();
        self.playback.prepare();
        self.processor.reset();

        shared.running.store(false, Ordering::Release);
        self.emit(EngineEvent::Stopped);
    }

    fn set_event_handler(&mut self, handler: EventHandler) {
        self.events = Some(handler);
    }
}

// ============================================================================
// ENGINE
// ============================================================================

enum Lifecycle {
    Stopped(Box<dyn Session>),
    Running(JoinHandle<Box<dyn Session>>),
    /// The audio thread panicked and took the session with it
    Lost,
}

/// Audio engine running one effect between a capture and a playback device
pub struct AudioEngine {
    config: StreamConfig,
    params: Arc<ParameterStore>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl AudioEngine {
    /// Open the configured cpal device in both directions
    pub fn open(config: &StreamConfig) -> Result<Self> {
        info!(device = %config.device, format = %config.format, "Opening audio engine");
        match config.format {
            SampleFormat::I16 => {
                let (capture, playback) = open_duplex::<i16>(config)?;
                Self::new(config, Box::new(capture), Box::new(playback))
            }
            SampleFormat::F32 => {
                let (capture, playback) = open_duplex::<f32>(config)?;
                Self::new(config, Box::new(capture), Box::new(playback))
            }
        }
    }

    /// Build an engine over already-open device handles
    pub fn new<S: WireSample>(
        config: &StreamConfig,
        capture: Box<dyn CaptureDevice<S>>,
        playback: Box<dyn PlaybackDevice<S>>,
    ) -> Result<Self> {
        config.validate()?;

        if S::FORMAT != config.format {
            return Err(AudioError::InvalidConfiguration(format!(
                "devices stream {} but config asks for {}",
                S::FORMAT,
                config.format
            )));
        }
        if capture.channels() != config.input_channels.count()
            || playback.channels() != config.output_channels.count()
        {
            return Err(AudioError::InvalidConfiguration(format!(
                "device channels {}/{} do not match config {}/{}",
                capture.channels(),
                playback.channels(),
                config.input_channels.count(),
                config.output_channels.count()
            )));
        }

        let sample_rate = config.sample_rate.hz();
        let session = DuplexSession {
            capture,
            playback,
            processor: BlockProcessor::new(
                sample_rate,
                config.input_channels.count(),
                config.output_channels.count(),
            ),
            input: vec![S::default(); config.input_block_len()],
            output: vec![S::default(); config.output_block_len()],
            events: None,
        };

        let (stop_tx, stop_rx) = bounded(1);
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            audio_thread: AtomicCell::new(None),
            stop_tx,
            stop_rx,
        });

        debug!(
            rate = sample_rate,
            frames = config.frames_per_block,
            "Audio engine created"
        );

        Ok(Self {
            config: config.clone(),
            params: Arc::new(ParameterStore::new(sample_rate)),
            shared,
            lifecycle: Mutex::new(Lifecycle::Stopped(Box::new(session))),
        })
    }

    /// Install the event callback; ignored while a session is running
    pub fn with_event_handler<F>(self, handler: F) -> Self
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        if let Lifecycle::Stopped(session) = &mut *self.lock_lifecycle() {
            session.set_event_handler(Box::new(handler));
        }
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Shared parameter store; setters may be called from any thread
    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn parameters(&self) -> Parameters {
        self.params.snapshot()
    }

    pub fn select_effect(&self, kind: EffectKind) {
        self.params.select_effect(kind);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        if self.is_running() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the session back from a finished or stopped lifecycle
    fn reclaim(lifecycle: &mut Lifecycle) -> Result<Box<dyn Session>> {
        match std::mem::replace(lifecycle, Lifecycle::Lost) {
            Lifecycle::Stopped(session) => Ok(session),
            Lifecycle::Running(handle) => handle.join().map_err(|_| {
                error!("Audio thread panicked");
                AudioError::StreamError("audio thread panicked".to_string())
            }),
            Lifecycle::Lost => Err(AudioError::StreamError(
                "audio session lost after a panic".to_string(),
            )),
        }
    }

    /// Spawn the audio thread; a no-op while already running
    pub fn start(&self) -> Result<()> {
        if self.shared.on_audio_thread() {
            warn!("start() called from the audio thread, ignoring");
            return Ok(());
        }

        let mut lifecycle = self.lock_lifecycle();
        if let Lifecycle::Running(handle) = &*lifecycle {
            if self.is_running() && !handle.is_finished() {
                debug!("Audio engine already running");
                return Ok(());
            }
        }

        let mut session = Self::reclaim(&mut lifecycle)?;

        // Discard a stop request left over from the previous session
        while self.shared.stop_rx.try_recv().is_ok() {}

        let shared = Arc::clone(&self.shared);
        let params = Arc::clone(&self.params);
        self.shared.running.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name("stomp-audio".to_string())
            .spawn(move || {
                shared.audio_thread.store(Some(thread::current().id()));
                session.run(&shared, &params);
                // Cleared only after the last event so handlers still count as the audio thread
                shared.audio_thread.store(None);
                session
            });

        match spawned {
            Ok(handle) => {
                *lifecycle = Lifecycle::Running(handle);
                info!(effect = %self.params.active_effect(), "Audio engine started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(AudioError::OsError(format!("Failed to spawn audio thread: {}", e)))
            }
        }
    }

    /// Stop streaming and join the audio thread
    ///
    /// From the audio thread itself (an event handler) this only signals;
    /// the thread exits after the current block.
    pub fn stop(&self) -> Result<()> {
        if self.shared.on_audio_thread() {
            self.shared.request_stop();
            return Ok(());
        }

        let mut lifecycle = self.lock_lifecycle();
        if !matches!(&*lifecycle, Lifecycle::Running(_)) {
            return Ok(());
        }

        self.shared.request_stop();
        let reclaimed = Self::reclaim(&mut lifecycle);
        self.shared.running.store(false, Ordering::Release);
        *lifecycle = Lifecycle::Stopped(reclaimed?);

        info!("Audio engine stopped");
        Ok(())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        info!("Shutting down audio engine");
        if let Err(e) = self.stop() {
            error!("Audio engine did not stop cleanly: {}", e);
        }
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
