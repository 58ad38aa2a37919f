//! ImageSequenceSink - exports frames as numbered PNG files.
//!
//! Files go to a hidden staging directory next to the destination
//! (`.<name>.partial`). `finalize` renames it into place, `abort` deletes it.

use image::ImageFormat;
use log::{debug, info, trace, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::sink::{FrameSink, StreamInfo};
use crate::entities::error::SinkError;
use crate::entities::frame::Frame;

/// `frame_000042.png`
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.png", index)
}

/// `/out/shots` → `/out/.shots.partial`
pub fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sequence".to_string());
    destination.with_file_name(format!(".{}.partial", name))
}

pub struct ImageSequenceSink {
    destination: PathBuf,
    staging: PathBuf,
    open: bool,
    written: u64,
}

impl ImageSequenceSink {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        Self {
            staging: staging_path(&destination),
            destination,
            open: false,
            written: 0,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

impl FrameSink for ImageSequenceSink {
    fn begin(&mut self, info: &StreamInfo) -> Result<(), SinkError> {
        if self.destination.exists() {
            return Err(SinkError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", self.destination.display()),
            )));
        }
        if self.staging.exists() {
            warn!("Removing stale staging directory {}", self.staging.display());
            fs::remove_dir_all(&self.staging)?;
        }
        fs::create_dir_all(&self.staging)?;
        self.open = true;
        self.written = 0;
        info!(
            "Writing {} frames ({}x{}) to {}",
            info.frame_count,
            info.width,
            info.height,
            self.destination.display()
        );
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> Result<(), SinkError> {
        if !self.open {
            return Err(SinkError::Closed);
        }
        let path = self.staging.join(frame_file_name(frame.index()));
        frame
            .image()
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| SinkError::Image(format!("{}: {}", path.display(), e)))?;
        self.written += 1;
        trace!("Wrote {}", path.display());
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        if !self.open {
            return Err(SinkError::Closed);
        }
        self.open = false;
        fs::rename(&self.staging, &self.destination)?;
        info!("Wrote {} frames to {}", self.written, self.destination.display());
        Ok(())
    }

    fn abort(&mut self) {
        self.open = false;
        if self.staging.exists() {
            match fs::remove_dir_all(&self.staging) {
                Ok(()) => debug!("Discarded {}", self.staging.display()),
                Err(e) => warn!("Failed to remove {}: {}", self.staging.display(), e),
            }
        }
    }
}
