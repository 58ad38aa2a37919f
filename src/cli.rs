use clap::Parser;
use std::path::PathBuf;

use crate::core::driver::{RenderConfig, RenderMode};

// Video backend info (compile-time)
#[cfg(feature = "ffmpeg")]
const VIDEO_BACKEND: &str = "playa-ffmpeg 8.0 (libx264)";
#[cfg(not(feature = "ffmpeg"))]
const VIDEO_BACKEND: &str = "none (PNG sequences only)";

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Video:  ", VIDEO_BACKEND, "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// 2D cutscene renderer
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Scene manifest (JSON)
    #[arg(value_name = "SCENE")]
    pub scene: PathBuf,

    /// Export destination: a directory for PNG frames, or a .mp4 file (ffmpeg builds)
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Frames per second (overrides the manifest)
    #[arg(long = "fps", value_name = "N")]
    pub fps: Option<u32>,

    /// Output width in pixels (default: viewport width)
    #[arg(long = "width", value_name = "PX", requires = "height")]
    pub width: Option<u32>,

    /// Output height in pixels (default: viewport height)
    #[arg(long = "height", value_name = "PX", requires = "width")]
    pub height: Option<u32>,

    /// Play the scene in real time instead of exporting
    #[arg(long = "preview")]
    pub preview: bool,

    /// Resolve the scene and print its timing without rendering
    #[arg(long = "check")]
    pub check: bool,

    /// Render threads (default: 3/4 of the CPU cores)
    #[arg(short = 'j', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Enable debug logging to file (default: cutscene.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Settings stored in the manifest with command-line overrides applied.
    pub fn render_config(&self, stored: Option<RenderConfig>) -> RenderConfig {
        let mut config = match (stored, self.preview) {
            (Some(stored), false) => stored,
            (Some(stored), true) => RenderConfig {
                mode: RenderMode::Preview,
                realtime: true,
                ..stored
            },
            (None, false) => RenderConfig::export(),
            (None, true) => RenderConfig::preview(),
        };
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let (Some(w), Some(h)) = (self.width, self.height) {
            config.output_size = Some((w, h));
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["cutscene", "scene.json", "-o", "out"]).unwrap();
        assert_eq!(args.scene, PathBuf::from("scene.json"));
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.render_config(None), RenderConfig::export());
    }

    #[test]
    fn test_overrides_manifest() {
        let args = Args::try_parse_from([
            "cutscene", "scene.json", "--fps", "30", "--width", "640", "--height", "480", "-j", "3", "--preview",
        ])
        .unwrap();
        let stored = RenderConfig {
            fps: 12,
            clear_color: [9, 9, 9, 255],
            ..RenderConfig::export()
        };
        let config = args.render_config(Some(stored));
        assert_eq!(config.fps, 30);
        assert_eq!(config.output_size, Some((640, 480)));
        assert_eq!(config.workers, 3);
        assert_eq!(config.mode, RenderMode::Preview);
        assert!(config.realtime);
        assert_eq!(config.clear_color, [9, 9, 9, 255]);
    }

    #[test]
    fn test_width_requires_height() {
        assert!(Args::try_parse_from(["cutscene", "scene.json", "--width", "640"]).is_err());
    }

    #[test]
    fn test_verbosity_and_log() {
        let args = Args::try_parse_from(["cutscene", "s.json", "-vv", "-l"]).unwrap();
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
    }
}
