//! PreviewSurface - best-effort display target that keeps only the newest frame.
//!
//! The driver pushes into one clone while a display loop reads from another.
//! A frame replaced before anyone looked at it counts as superseded (dropped).

use log::{debug, trace};
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::sink::{FrameSink, StreamInfo};
use crate::entities::error::SinkError;
use crate::entities::frame::Frame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreviewStats {
    /// Frames pushed by the driver.
    pub received: u64,
    /// Frames replaced before they were observed.
    pub superseded: u64,
}

#[derive(Default)]
struct Shared {
    latest: Option<Frame>,
    observed: bool,
    stats: PreviewStats,
    info: Option<StreamInfo>,
    finished: bool,
}

/// Shared handle; clones see the same surface.
#[derive(Clone, Default)]
pub struct PreviewSurface {
    shared: Arc<(Mutex<Shared>, Condvar)>,
}

impl PreviewSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for a frame nobody has seen yet and mark it shown.
    /// `None` on timeout or once the run is over with nothing left to show.
    pub fn next_frame(&self, timeout: Duration) -> Option<Frame> {
        let mut shared = self.lock();
        loop {
            if !shared.observed
                && let Some(frame) = &shared.latest
            {
                let frame = frame.clone();
                shared.observed = true;
                return Some(frame);
            }
            if shared.finished {
                return None;
            }
            let (guard, wait) = self
                .shared
                .1
                .wait_timeout(shared, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            shared = guard;
            if wait.timed_out() {
                return None;
            }
        }
    }

    /// Display loop on its own thread: calls `show` for every frame it gets to
    /// see until the run is over. Returns the number of frames shown.
    pub fn spawn_viewer<F>(&self, mut show: F) -> io::Result<JoinHandle<u64>>
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        let surface = self.clone();
        thread::Builder::new()
            .name("cutscene-preview".into())
            .spawn(move || {
                let mut shown = 0;
                loop {
                    match surface.next_frame(Duration::from_millis(100)) {
                        Some(frame) => {
                            show(&frame);
                            shown += 1;
                        }
                        None if surface.is_finished() => break,
                        None => {}
                    }
                }
                trace!("Preview viewer showed {} frames", shown);
                shown
            })
    }

    /// Copy of the newest frame, marking it as shown.
    pub fn latest(&self) -> Option<Frame> {
        let mut shared = self.lock();
        shared.observed = true;
        shared.latest.clone()
    }

    /// Index of the newest frame without marking it as shown.
    pub fn latest_index(&self) -> Option<u64> {
        self.lock().latest.as_ref().map(Frame::index)
    }

    pub fn stats(&self) -> PreviewStats {
        self.lock().stats
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.lock().info
    }

    /// True once the run finished or was aborted.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}

impl FrameSink for PreviewSurface {
    fn begin(&mut self, info: &StreamInfo) -> Result<(), SinkError> {
        let mut shared = self.lock();
        *shared = Shared {
            info: Some(*info),
            ..Shared::default()
        };
        debug!("Preview surface {}x{} @ {} fps", info.width, info.height, info.fps);
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> Result<(), SinkError> {
        let mut shared = self.lock();
        if shared.finished {
            return Err(SinkError::Closed);
        }
        if shared.latest.is_some() && !shared.observed {
            shared.stats.superseded += 1;
            trace!("Preview dropped an unseen frame before {}", frame.index());
        }
        shared.latest = Some(frame);
        shared.observed = false;
        shared.stats.received += 1;
        self.shared.1.notify_all();
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        let mut shared = self.lock();
        shared.finished = true;
        self.shared.1.notify_all();
        debug!(
            "Preview finished: {} frames, {} superseded",
            shared.stats.received, shared.stats.superseded
        );
        Ok(())
    }

    fn abort(&mut self) {
        let mut shared = self.lock();
        shared.latest = None;
        shared.finished = true;
        self.shared.1.notify_all();
    }
}
