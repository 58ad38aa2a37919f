//! H.264/MP4 export sink (feature `ffmpeg`).
//!
//! Frames are written to `<name>.partial.mp4` next to the destination and only
//! renamed into place by `finalize`. `abort` deletes the partial file.
//!
//! Pixel path: RGBA8 → RGB24 → YUV420P. The swscale context is built per frame
//! on whichever thread is encoding, so the session holds no thread-bound state.

use log::{debug, info, trace, warn};
use playa_ffmpeg as ffmpeg;
use std::fs;
use std::path::{Path, PathBuf};

use super::sink::{FrameSink, StreamInfo};
use crate::entities::error::SinkError;
use crate::entities::frame::Frame;

const ENCODER_NAME: &str = "libx264";

/// Open encoder + muxer for one export.
struct Session {
    octx: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    encoder_tb: ffmpeg::Rational,
    stream_tb: ffmpeg::Rational,
    width: u32,
    height: u32,
    pts: i64,
}

impl Session {
    fn open(path: &Path, info: &StreamInfo, crf: u32) -> Result<Self, SinkError> {
        ffmpeg::init().map_err(|e| encode_err("FFmpeg init failed", e))?;
        unsafe {
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_QUIET);
        }

        let mut octx = ffmpeg::format::output(&path).map_err(|e| encode_err("Failed to create output", e))?;
        let codec = ffmpeg::encoder::find_by_name(ENCODER_NAME)
            .ok_or_else(|| SinkError::Encode(format!("Encoder '{}' not found", ENCODER_NAME)))?;

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| encode_err("Failed to create encoder", e))?;

        let fps = info.fps as i32;
        encoder.set_width(info.width);
        encoder.set_height(info.height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        encoder.set_time_base(ffmpeg::Rational::new(1, fps));
        encoder.set_gop((fps * 10).max(1) as u32);

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("crf", &crf.to_string());
        opts.set("preset", "medium");

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| encode_err("Failed to open encoder", e))?;

        let mut ost = octx.add_stream(codec).map_err(|e| encode_err("Failed to add stream", e))?;
        ost.set_parameters(&encoder);
        ost.set_time_base(encoder.time_base());

        let mut container_opts = ffmpeg::Dictionary::new();
        container_opts.set("movflags", "faststart");
        octx.write_header_with(container_opts)
            .map_err(|e| encode_err("Failed to write header", e))?;

        // The muxer may adjust the stream time base in write_header
        let stream_tb = octx
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| SinkError::Encode("Output has no video stream".into()))?;
        let encoder_tb = encoder.time_base();

        debug!(
            "Encoder initialized: {}x{} @ {} fps, crf {}, time_base: encoder={:?} stream={:?}",
            info.width, info.height, info.fps, crf, encoder_tb, stream_tb
        );

        Ok(Self {
            octx,
            encoder,
            encoder_tb,
            stream_tb,
            width: info.width,
            height: info.height,
            pts: 0,
        })
    }

    fn encode(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if frame.resolution() != (self.width, self.height) {
            return Err(SinkError::Encode(format!(
                "Frame {} is {}x{}, stream is {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let rgb24 = frame.to_rgb24();
        let mut src = ffmpeg::util::frame::video::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let stride = src.stride(0);
        let row_bytes = self.width as usize * 3;
        {
            let data = src.data_mut(0);
            for y in 0..self.height as usize {
                data[y * stride..y * stride + row_bytes]
                    .copy_from_slice(&rgb24[y * row_bytes..(y + 1) * row_bytes]);
            }
        }

        let mut yuv = ffmpeg::util::frame::video::Video::new(ffmpeg::format::Pixel::YUV420P, self.width, self.height);
        let mut scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            self.width,
            self.height,
            ffmpeg::format::Pixel::YUV420P,
            self.width,
            self.height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| encode_err("Failed to create swscale context", e))?;
        scaler
            .run(&src, &mut yuv)
            .map_err(|e| encode_err("swscale conversion failed", e))?;

        yuv.set_pts(Some(self.pts));
        self.pts += 1;

        self.encoder
            .send_frame(&yuv)
            .map_err(|e| encode_err(&format!("Failed to send frame {}", frame.index()), e))?;
        self.drain()
    }

    /// Write every packet the encoder has ready.
    fn drain(&mut self) -> Result<(), SinkError> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.rescale_ts(self.encoder_tb, self.stream_tb);
            packet.set_stream(0);
            if packet.dts().is_none()
                && let Some(pts) = packet.pts()
            {
                packet.set_dts(Some(pts));
            }
            packet
                .write_interleaved(&mut self.octx)
                .map_err(|e| encode_err("Failed to write packet", e))?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), SinkError> {
        self.encoder
            .send_eof()
            .map_err(|e| encode_err("Failed to flush encoder", e))?;
        self.drain()?;
        self.octx
            .write_trailer()
            .map_err(|e| encode_err("Failed to write trailer", e))
    }
}

fn encode_err(what: &str, e: ffmpeg::Error) -> SinkError {
    SinkError::Encode(format!("{}: {}", what, e))
}

/// `out.mp4` → `out.partial.mp4`
pub fn partial_path(destination: &Path) -> PathBuf {
    destination.with_extension("partial.mp4")
}

/// Export sink writing an H.264 MP4 with libx264.
pub struct FfmpegSink {
    destination: PathBuf,
    partial: PathBuf,
    crf: u32,
    session: Option<Session>,
    frames: u64,
}

impl FfmpegSink {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        Self {
            partial: partial_path(&destination),
            destination,
            crf: 23,
            session: None,
            frames: 0,
        }
    }

    /// Constant rate factor, 0 (lossless) ..= 51. Default 23.
    pub fn with_crf(mut self, crf: u32) -> Self {
        self.crf = crf.min(51);
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    fn remove_partial(&self) {
        if self.partial.exists()
            && let Err(e) = fs::remove_file(&self.partial)
        {
            warn!("Failed to remove {}: {}", self.partial.display(), e);
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, info: &StreamInfo) -> Result<(), SinkError> {
        if self.destination.exists() {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", self.destination.display()),
            )));
        }
        if info.width % 2 != 0 || info.height % 2 != 0 {
            return Err(SinkError::Encode(format!(
                "{} needs even dimensions, got {}x{}",
                ENCODER_NAME, info.width, info.height
            )));
        }
        info!(
            "Encoding {} frames to {} (partial: {})",
            info.frame_count,
            self.destination.display(),
            self.partial.display()
        );
        self.session = Some(Session::open(&self.partial, info, self.crf)?);
        self.frames = 0;
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> Result<(), SinkError> {
        let session = self.session.as_mut().ok_or(SinkError::Closed)?;
        session.encode(&frame)?;
        self.frames += 1;
        trace!("Encoded frame {}", frame.index());
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        let session = self.session.take().ok_or(SinkError::Closed)?;
        session.finish()?;
        fs::rename(&self.partial, &self.destination)?;
        info!("Encoding complete: {} frames written to {}", self.frames, self.destination.display());
        Ok(())
    }

    fn abort(&mut self) {
        // Dropping the session closes the output file
        self.session = None;
        self.remove_partial();
        debug!("Encoding aborted, {} discarded", self.partial.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32) -> StreamInfo {
        StreamInfo {
            width,
            height,
            fps: 24,
            frame_count: 1,
        }
    }

    fn assert_send<T: Send>() {}

    /// Test: Sink type used from the driver's delivery thread
    /// Validates: The sink is `Send` without any manual impl
    #[test]
    fn test_sink_is_send() {
        assert_send::<FfmpegSink>();
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(partial_path(Path::new("/tmp/out.mp4")), PathBuf::from("/tmp/out.partial.mp4"));
    }

    #[test]
    fn test_existing_destination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("taken.mp4");
        fs::write(&dest, b"keep me").unwrap();

        let mut sink = FfmpegSink::new(&dest);
        assert!(matches!(sink.begin(&info(32, 24)), Err(SinkError::Io(_))));
        sink.abort();
        assert_eq!(fs::read(&dest).unwrap(), b"keep me");
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSink::new(dir.path().join("odd.mp4"));
        assert!(matches!(sink.begin(&info(33, 24)), Err(SinkError::Encode(_))));
    }

    #[test]
    fn test_push_before_begin() {
        let mut sink = FfmpegSink::new("never.mp4");
        let frame = Frame::new(0, 0.0, 2, 2, image::Rgba([0, 0, 0, 255]));
        assert!(matches!(sink.push(frame), Err(SinkError::Closed)));
    }
}
