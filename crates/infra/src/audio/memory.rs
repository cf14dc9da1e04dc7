//! In-memory capture and playback devices
//!
//! Drive the engine without hardware: a [`CaptureFeed`] pushes interleaved
//! samples into a [`MemoryCapture`], and a [`PlaybackSink`] collects what the
//! engine wrote to a [`MemoryPlayback`]. Both sides can inject xruns.

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stomp_core::domain::codec::WireSample;
use stomp_core::domain::device::{CaptureDevice, IoStatus, PlaybackDevice};

#[derive(Default)]
struct Port<S> {
    queue: SegQueue<S>,
    xrun: AtomicBool,
    prepares: AtomicUsize,
}

impl<S> Port<S> {
    fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}

pub struct MemoryCapture<S> {
    port: Arc<Port<S>>,
    ready: Receiver<()>,
    channels: u16,
}

/// Test-side handle feeding a [`MemoryCapture`]
#[derive(Clone)]
pub struct CaptureFeed<S> {
    port: Arc<Port<S>>,
    ready: Sender<()>,
}

pub struct MemoryPlayback<S> {
    port: Arc<Port<S>>,
    channels: u16,
}

/// Test-side handle reading what a [`MemoryPlayback`] received
#[derive(Clone)]
pub struct PlaybackSink<S> {
    port: Arc<Port<S>>,
}

pub fn memory_capture<S: WireSample>(channels: u16) -> (MemoryCapture<S>, CaptureFeed<S>) {
    let port = Arc::new(Port::default());
    let (ready_tx, ready_rx) = bounded(1);
    (
        MemoryCapture {
            port: Arc::clone(&port),
            ready: ready_rx,
            channels,
        },
        CaptureFeed {
            port,
            ready: ready_tx,
        },
    )
}

pub fn memory_playback<S: WireSample>(channels: u16) -> (MemoryPlayback<S>, PlaybackSink<S>) {
    let port = Arc::new(Port::default());
    (
        MemoryPlayback {
            port: Arc::clone(&port),
            channels,
        },
        PlaybackSink { port },
    )
}

impl<S: WireSample> CaptureFeed<S> {
    /// Queue interleaved samples and wake the reader
    pub fn push(&self, samples: &[S]) {
        for &sample in samples {
            self.port.queue.push(sample);
        }
        let _ = self.ready.try_send(());
    }

    /// Make the next read report an overrun
    pub fn inject_overrun(&self) {
        self.port.xrun.store(true, Ordering::Release);
        let _ = self.ready.try_send(());
    }

    /// Samples queued but not yet read
    pub fn pending(&self) -> usize {
        self.port.queue.len()
    }

    pub fn prepare_count(&self) -> usize {
        self.port.prepares.load(Ordering::Acquire)
    }
}

impl<S: WireSample> PlaybackSink<S> {
    /// Remove and return everything written so far
    pub fn take(&self) -> Vec<S> {
        let mut out = Vec::with_capacity(self.port.queue.len());
        while let Some(sample) = self.port.queue.pop() {
            out.push(sample);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.port.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.port.queue.is_empty()
    }

    /// Poll until at least `samples` are queued. Returns false on timeout.
    pub fn wait_for(&self, samples: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.port.queue.len() < samples {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Make the next write report an underrun
    pub fn inject_underrun(&self) {
        self.port.xrun.store(true, Ordering::Release);
    }

    pub fn prepare_count(&self) -> usize {
        self.port.prepares.load(Ordering::Acquire)
    }
}

impl<S: WireSample> CaptureDevice<S> for MemoryCapture<S> {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn readiness(&self) -> Receiver<()> {
        self.ready.clone()
    }

    fn read(&mut self, block: &mut [S]) -> IoStatus {
        if self.port.xrun.load(Ordering::Acquire) {
            return IoStatus::Xrun;
        }
        if self.port.queue.len() < block.len() {
            return IoStatus::WouldBlock;
        }
        for slot in block.iter_mut() {
            match self.port.queue.pop() {
                Some(sample) => *slot = sample,
                None => return IoStatus::WouldBlock,
            }
        }
        IoStatus::Frames(block.len() / self.channels as usize)
    }

    /// Clears the overrun but keeps queued samples, so tests can feed ahead
    fn prepare(&mut self) {
        self.port.xrun.store(false, Ordering::Release);
        self.port.prepares.fetch_add(1, Ordering::AcqRel);
    }

    fn drop_pending(&mut self) {
        self.port.clear();
    }
}

impl<S: WireSample> PlaybackDevice<S> for MemoryPlayback<S> {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn write(&mut self, block: &[S]) -> IoStatus {
        if self.port.xrun.load(Ordering::Acquire) {
            return IoStatus::Xrun;
        }
        for &sample in block {
            self.port.queue.push(sample);
        }
        IoStatus::Frames(block.len() / self.channels as usize)
    }

    fn prepare(&mut self) {
        self.port.xrun.store(false, Ordering::Release);
        self.port.prepares.fetch_add(1, Ordering::AcqRel);
    }

    /// Written samples belong to the sink; nothing is pending
    fn drop_pending(&mut self) {}
}
