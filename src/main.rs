use cutscene::cli::Args;
use cutscene::core::driver::{CancelToken, FrameDriver, RenderConfig, RenderMode, RenderOutcome, RenderProgress, RenderStage};
use cutscene::core::timeline::TimelineResolver;
use cutscene::encode::{FrameSink, ImageSequenceSink, PreviewSurface};
use cutscene::manifest;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Cutscene {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let (scene, stored) = manifest::load_scene(&args.scene)?;
    let config = args.render_config(stored);

    let timeline = TimelineResolver::new()
        .resolve(&scene)
        .with_context(|| format!("Scene '{}' cannot be rendered", scene.name))?;
    let timeline = Arc::new(timeline);

    if args.check {
        println!(
            "{}: {:.3}s, {} actors, {} frames at {} fps",
            timeline.scene_name,
            timeline.total_duration,
            timeline.actors.len(),
            timeline.frame_count(config.fps),
            config.fps
        );
        return Ok(());
    }

    let preview = PreviewSurface::new();
    let mut sink = open_sink(&args, &config, &preview)?;
    let viewer = if args.output.is_none() && config.mode == RenderMode::Preview {
        let viewer = preview
            .spawn_viewer(|frame| {
                debug!(
                    "Showing frame {} (t={:.3}s, {}x{})",
                    frame.index(),
                    frame.timestamp(),
                    frame.width(),
                    frame.height()
                )
            })
            .context("Failed to spawn preview thread")?;
        Some(viewer)
    } else {
        None
    };

    let (progress_tx, progress_rx) = crossbeam_channel::unbounded::<RenderProgress>();
    let report_every = u64::from(config.fps.max(1));
    let reporter = thread::Builder::new()
        .name("cutscene-progress".into())
        .spawn(move || {
            for p in progress_rx.iter() {
                match p.stage {
                    RenderStage::Rendering if p.current_frame % report_every == 0 => {
                        info!("Rendered {}/{} frames", p.current_frame, p.total_frames)
                    }
                    RenderStage::Rendering => {}
                    stage => debug!("Stage: {:?}", stage),
                }
            }
        })
        .context("Failed to spawn progress thread")?;

    let driver = FrameDriver::new(config.clone()).with_progress(progress_tx);
    let outcome = driver.run(Arc::clone(&timeline), &mut *sink, &CancelToken::new());
    drop(driver);
    if reporter.join().is_err() {
        warn!("Progress thread panicked");
    }
    let previewing = viewer.is_some();
    if previewing && outcome.is_err() {
        // Rejected settings never reach the sink; release the viewer
        preview.clone().abort();
    }
    let shown = match viewer.map(|v| v.join()) {
        Some(Ok(shown)) => shown,
        Some(Err(_)) => {
            warn!("Preview thread panicked");
            0
        }
        None => 0,
    };

    match outcome.context("Render failed")? {
        RenderOutcome::Completed { frames, duration } => {
            if previewing {
                let stats = preview.stats();
                println!(
                    "Previewed {} frames ({:.3}s): {} shown, {} dropped",
                    stats.received, duration, shown, stats.superseded
                );
            } else {
                println!("Rendered {} frames ({:.3}s)", frames, duration);
            }
        }
        RenderOutcome::Cancelled { delivered } => {
            println!("Cancelled after {} frames", delivered);
        }
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt.clone().unwrap_or_else(|| PathBuf::from("cutscene.log"));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Pick the sink for the requested mode and destination.
fn open_sink(args: &Args, config: &RenderConfig, preview: &PreviewSurface) -> Result<Box<dyn FrameSink>> {
    match (&args.output, config.mode) {
        (None, RenderMode::Preview) => Ok(Box::new(preview.clone())),
        (None, RenderMode::Export) => bail!("Export needs an output path (-o), or use --preview"),
        (Some(path), _) if is_video(path) => video_sink(path),
        (Some(path), _) => Ok(Box::new(ImageSequenceSink::new(path))),
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
}

#[cfg(feature = "ffmpeg")]
fn video_sink(path: &Path) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(cutscene::encode::FfmpegSink::new(path)))
}

#[cfg(not(feature = "ffmpeg"))]
fn video_sink(path: &Path) -> Result<Box<dyn FrameSink>> {
    bail!(
        "{}: video export requires the `ffmpeg` feature; pass a directory for PNG frames",
        path.display()
    )
}
