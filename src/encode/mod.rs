//! Frame sinks - preview surface and export targets.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod preview;
pub mod sequence;
pub mod sink;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSink;
pub use preview::{PreviewStats, PreviewSurface};
pub use sequence::ImageSequenceSink;
pub use sink::{FrameSink, StreamInfo};
