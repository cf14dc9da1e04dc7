//! Non-blocking device handles the engine loop drives
//!
//! A capture device exposes a readiness channel that fires whenever a new
//! block may be available. Reads and writes never block: they either move
//! exactly one block, report that the device has nothing to offer right
//! now, or report an xrun that the caller recovers from with `prepare`.

use crate::domain::codec::WireSample;
use crossbeam::channel::Receiver;
use std::fmt;

/// Outcome of one non-blocking device call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// One full block of this many frames was transferred
    Frames(usize),
    /// Nothing can be transferred without waiting
    WouldBlock,
    /// The device lost frames and must be re-primed
    Xrun,
}

/// Stream direction, used to tag xrun reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Capture => f.write_str("capture"),
            Direction::Playback => f.write_str("playback"),
        }
    }
}

pub trait CaptureDevice<S: WireSample>: Send {
    /// Interleaved channel count
    fn channels(&self) -> u16;

    /// Signalled when new frames arrive; spurious wakes are allowed
    fn readiness(&self) -> Receiver<()>;

    /// Fill `block` with exactly one block of interleaved samples
    fn read(&mut self, block: &mut [S]) -> IoStatus;

    /// Clear an xrun condition so capture resumes
    fn prepare(&mut self);

    /// Discard frames captured but not yet read
    fn drop_pending(&mut self);
}

pub trait PlaybackDevice<S: WireSample>: Send {
    /// Interleaved channel count
    fn channels(&self) -> u16;

    /// Queue exactly one block of interleaved samples
    fn write(&mut self, block: &[S]) -> IoStatus;

    /// Clear an xrun condition so playback resumes
    fn prepare(&mut self);

    /// Discard frames queued but not yet played
    fn drop_pending(&mut self);
}

impl<S: WireSample> CaptureDevice<S> for Box<dyn CaptureDevice<S>> {
    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn readiness(&self) -> Receiver<()> {
        (**self).readiness()
    }

    fn read(&mut self, block: &mut [S]) -> IoStatus {
        (**self).read(block)
    }

    fn prepare(&mut self) {
        (**self).prepare()
    }

    fn drop_pending(&mut self) {
        (**self).drop_pending()
    }
}

impl<S: WireSample> PlaybackDevice<S> for Box<dyn PlaybackDevice<S>> {
    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn write(&mut self, block: &[S]) -> IoStatus {
        (**self).write(block)
    }

    fn prepare(&mut self) {
        (**self).prepare()
    }

    fn drop_pending(&mut self) {
        (**self).drop_pending()
    }
}
