//! FrameSink - ordered, single-writer destination for rendered frames.

use crate::entities::error::SinkError;
use crate::entities::frame::Frame;

/// Stream parameters announced to a sink before the first frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
}

/// Destination of a frame stream (preview surface, image sequence, encoder).
///
/// The driver calls `begin` once, then `push` with strictly increasing
/// frame indices, then exactly one of `finalize` or `abort`. `abort` must
/// discard any partial output and never fail.
pub trait FrameSink: Send {
    fn begin(&mut self, _info: &StreamInfo) -> Result<(), SinkError> {
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> Result<(), SinkError>;

    fn finalize(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn abort(&mut self) {}
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn begin(&mut self, info: &StreamInfo) -> Result<(), SinkError> {
        (**self).begin(info)
    }

    fn push(&mut self, frame: Frame) -> Result<(), SinkError> {
        (**self).push(frame)
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        (**self).finalize()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}
