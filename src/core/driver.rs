//! FrameDriver - renders a resolved timeline frame by frame into a sink.
//!
//! Frames are computed in parallel and delivered in strict index order:
//!
//! ```text
//! dispatcher ──(index)──► cutscene-render-N ──(frame)──► cutscene-sink ──► FrameSink
//!     ▲                                                        │
//!     └──────────────────────────(credit)──────────────────────┘
//! ```
//!
//! - Every render worker owns a `ClockCursor`, so pose lookups stay cheap.
//! - The credit channel bounds how many frames are in flight, which caps
//!   the size of the reorder buffer.
//! - The sink thread is the only writer. It reorders frames in a `BTreeMap`.
//!
//! Cancellation is cooperative: workers check the token before starting a
//! frame, the sink thread checks it before every push. Frames computed after
//! cancellation are discarded, never delivered.

use crossbeam_channel::{Sender, bounded, unbounded};
use image::Rgba;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::clock::SceneClock;
use super::compositor::Compositor;
use super::timeline::{ResolvedTimeline, frame_time};
use crate::encode::sink::{FrameSink, StreamInfo};
use crate::entities::error::SinkError;
use crate::entities::frame::Frame;

/// Who the frames are for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Best-effort display, paced to wall-clock time.
    Preview,
    /// Every frame, as fast as possible.
    Export,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Preview => write!(f, "Preview"),
            RenderMode::Export => write!(f, "Export"),
        }
    }
}

/// Render settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredRenderConfig")]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub fps: u32,
    /// Output buffer size; `None` uses the viewport size.
    pub output_size: Option<(u32, u32)>,
    /// Render threads, 0 = auto.
    pub workers: usize,
    /// Frames allowed in flight, 0 = twice the worker count.
    pub max_in_flight: usize,
    /// Pace delivery to wall-clock time.
    pub realtime: bool,
    pub clear_color: [u8; 4],
}

/// Serialized form: every field optional, `realtime` defaults from `mode`.
#[derive(Deserialize)]
#[serde(default)]
struct StoredRenderConfig {
    mode: RenderMode,
    fps: u32,
    output_size: Option<(u32, u32)>,
    workers: usize,
    max_in_flight: usize,
    realtime: Option<bool>,
    clear_color: [u8; 4],
}

impl Default for StoredRenderConfig {
    fn default() -> Self {
        let export = RenderConfig::export();
        Self {
            mode: export.mode,
            fps: export.fps,
            output_size: export.output_size,
            workers: export.workers,
            max_in_flight: export.max_in_flight,
            realtime: None,
            clear_color: export.clear_color,
        }
    }
}

impl From<StoredRenderConfig> for RenderConfig {
    fn from(stored: StoredRenderConfig) -> Self {
        Self {
            mode: stored.mode,
            fps: stored.fps,
            output_size: stored.output_size,
            workers: stored.workers,
            max_in_flight: stored.max_in_flight,
            realtime: stored.realtime.unwrap_or(stored.mode == RenderMode::Preview),
            clear_color: stored.clear_color,
        }
    }
}

impl RenderConfig {
    pub fn preview() -> Self {
        Self {
            mode: RenderMode::Preview,
            realtime: true,
            ..Self::export()
        }
    }

    pub fn export() -> Self {
        Self {
            mode: RenderMode::Export,
            fps: 24,
            output_size: None,
            workers: 0,
            max_in_flight: 0,
            realtime: false,
            clear_color: [0, 0, 0, 255],
        }
    }

    /// Worker count with `0` resolved to `num_cpus * 3/4` (min 1).
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            (num_cpus::get() * 3 / 4).max(1)
        }
    }

    /// Frames allowed in flight for a run of `total_frames`, never more than
    /// the run needs.
    pub fn window(&self, workers: usize, total_frames: u64) -> usize {
        let wanted = match self.max_in_flight {
            0 => workers.saturating_mul(2),
            n => n,
        };
        let cap = usize::try_from(total_frames).unwrap_or(usize::MAX);
        wanted.min(cap).max(1)
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.fps == 0 {
            return Err(RenderError::InvalidConfig("fps must be at least 1".into()));
        }
        if let Some((w, h)) = self.output_size
            && (w == 0 || h == 0)
        {
            return Err(RenderError::InvalidConfig(format!("output size {}x{} is empty", w, h)));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::export()
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Render progress (for UI updates)
#[derive(Clone, Debug, PartialEq)]
pub struct RenderProgress {
    pub current_frame: u64,
    pub total_frames: u64,
    pub stage: RenderStage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderStage {
    Starting,      // Sink is being opened
    Rendering,     // Frames are being delivered
    Finalizing,    // Sink is flushing
    Complete,      // Successfully finished
    Cancelled,     // Stopped by the cancel token
    Error(String), // Failed with error
}

/// Terminal state of a run that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    /// Every frame was delivered and the sink finalized.
    /// `duration` is the scene length in seconds.
    Completed { frames: u64, duration: f64 },
    /// Stopped by the cancel token; the sink was aborted.
    Cancelled { delivered: u64 },
}

#[derive(Debug)]
pub enum RenderError {
    InvalidConfig(String),
    Sink(SinkError),
    /// A render worker panicked while computing the frame.
    Worker { frame: u64, message: String },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InvalidConfig(msg) => write!(f, "Invalid render settings: {}", msg),
            RenderError::Sink(e) => write!(f, "{}", e),
            RenderError::Worker { frame, message } => {
                write!(f, "Render worker failed on frame {}: {}", frame, message)
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Sink(e) => Some(e),
            RenderError::InvalidConfig(_) | RenderError::Worker { .. } => None,
        }
    }
}

impl From<SinkError> for RenderError {
    fn from(e: SinkError) -> Self {
        RenderError::Sink(e)
    }
}

/// Worker → sink thread message. Skipped and failed slots keep the reorder
/// buffer moving after cancellation, a sink failure or a worker panic.
enum Slot {
    Rendered(Frame),
    Skipped(u64),
    Failed(u64, String),
}

impl Slot {
    fn index(&self) -> u64 {
        match self {
            Slot::Rendered(frame) => frame.index(),
            Slot::Skipped(index) | Slot::Failed(index, _) => *index,
        }
    }
}

/// What the sink thread saw.
struct Delivery {
    delivered: u64,
    late: u64,
    failure: Option<RenderError>,
}

impl Delivery {
    fn failed(failure: RenderError) -> Self {
        Self {
            delivered: 0,
            late: 0,
            failure: Some(failure),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct FrameDriver {
    config: RenderConfig,
    progress_tx: Option<Sender<RenderProgress>>,
}

impl FrameDriver {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            progress_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: Sender<RenderProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render every frame `k` with `k / fps <= total_duration` into `sink`.
    ///
    /// On success the sink is finalized. On cancellation or sink failure it is
    /// aborted and `finalize` is never called.
    ///
    /// # Errors
    ///
    /// - `RenderError::InvalidConfig`: zero fps or empty output size (sink untouched)
    /// - `RenderError::Sink`: the sink failed in `begin`, `push` or `finalize`,
    ///   or no render thread could be started
    /// - `RenderError::Worker`: computing a frame panicked
    pub fn run(
        &self,
        timeline: Arc<ResolvedTimeline>,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
    ) -> Result<RenderOutcome, RenderError> {
        self.config.validate()?;

        let fps = self.config.fps;
        let total_frames = timeline.frame_count(fps);
        let [r, g, b, a] = self.config.clear_color;
        let compositor = Compositor::for_timeline(&timeline, self.config.output_size, Rgba([r, g, b, a]));
        let (width, height) = compositor.output_size();
        let workers = self.config.worker_count().min(total_frames as usize).max(1);
        let window = self.config.window(workers, total_frames);

        info!(
            "{} '{}': {} frames at {} fps, {}x{}, {} workers",
            self.config.mode, timeline.scene_name, total_frames, fps, width, height, workers
        );
        let started = Instant::now();

        self.report(0, total_frames, RenderStage::Starting);
        let info = StreamInfo {
            width,
            height,
            fps,
            frame_count: total_frames,
        };
        if let Err(e) = sink.begin(&info) {
            return Err(self.fail(sink, e.into(), 0, total_frames));
        }

        let delivery = self.pump(&timeline, &compositor, sink, cancel, total_frames, workers, window);
        debug!(
            "Delivered {}/{} frames in {:.2?} ({} late)",
            delivery.delivered,
            total_frames,
            started.elapsed(),
            delivery.late
        );

        if let Some(e) = delivery.failure {
            return Err(self.fail(sink, e, delivery.delivered, total_frames));
        }

        if cancel.is_cancelled() {
            info!("Render cancelled after {} frames", delivery.delivered);
            sink.abort();
            self.report(delivery.delivered, total_frames, RenderStage::Cancelled);
            return Ok(RenderOutcome::Cancelled {
                delivered: delivery.delivered,
            });
        }

        self.report(delivery.delivered, total_frames, RenderStage::Finalizing);
        if let Err(e) = sink.finalize() {
            return Err(self.fail(sink, e.into(), delivery.delivered, total_frames));
        }

        self.report(delivery.delivered, total_frames, RenderStage::Complete);
        info!(
            "Render complete: {} frames ({:.3}s of scene) in {:.2?}",
            delivery.delivered,
            timeline.total_duration,
            started.elapsed()
        );
        Ok(RenderOutcome::Completed {
            frames: delivery.delivered,
            duration: timeline.total_duration,
        })
    }

    /// Dispatch, render and deliver. Returns once every thread has exited.
    #[allow(clippy::too_many_arguments)]
    fn pump(
        &self,
        timeline: &Arc<ResolvedTimeline>,
        compositor: &Compositor,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
        total_frames: u64,
        workers: usize,
        window: usize,
    ) -> Delivery {
        let fps = self.config.fps;
        let realtime = self.config.realtime;
        let stop = AtomicBool::new(false);

        let (job_tx, job_rx) = bounded::<u64>(window);
        let (slot_tx, slot_rx) = unbounded::<Slot>();
        let (credit_tx, credit_rx) = bounded::<()>(window);
        for _ in 0..window {
            let _ = credit_tx.send(());
        }

        thread::scope(|scope| {
            let mut spawned = 0;
            let mut spawn_error = None;
            for worker_id in 0..workers {
                let job_rx = job_rx.clone();
                let slot_tx = slot_tx.clone();
                let clock = SceneClock::new(Arc::clone(timeline));
                let stop = &stop;

                let spawned_worker = thread::Builder::new()
                    .name(format!("cutscene-render-{}", worker_id))
                    .spawn_scoped(scope, move || {
                        trace!("Render worker {} started", worker_id);
                        let mut cursor = clock.cursor();
                        while let Ok(index) = job_rx.recv() {
                            let slot = if cancel.is_cancelled() || stop.load(Ordering::Relaxed) {
                                Slot::Skipped(index)
                            } else {
                                let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
                                    let mut poses = clock.advance(&mut cursor, frame_time(index, fps));
                                    compositor.cull(&mut poses, clock.timeline());
                                    compositor.render(&poses, clock.timeline(), index)
                                }));
                                match rendered {
                                    Ok(frame) => Slot::Rendered(frame),
                                    Err(payload) => {
                                        // Cursor state is unknown after a panic
                                        cursor = clock.cursor();
                                        stop.store(true, Ordering::Relaxed);
                                        Slot::Failed(index, panic_message(&*payload))
                                    }
                                }
                            };
                            if slot_tx.send(slot).is_err() {
                                break;
                            }
                        }
                        trace!("Render worker {} stopped", worker_id);
                    });
                match spawned_worker {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        warn!("Failed to spawn render worker {}: {}", worker_id, e);
                        spawn_error = Some(e);
                    }
                }
            }
            // Workers hold the only remaining slot senders
            drop(slot_tx);
            drop(job_rx);

            if spawned == 0 {
                let e = spawn_error.unwrap_or_else(|| std::io::Error::other("no render workers"));
                return Delivery::failed(RenderError::Sink(SinkError::Io(e)));
            }

            let stop_ref = &stop;
            let consumer = thread::Builder::new()
                .name("cutscene-sink".into())
                .spawn_scoped(scope, move || {
                    let mut pending: BTreeMap<u64, Slot> = BTreeMap::new();
                    let mut next = 0u64;
                    let mut delivery = Delivery {
                        delivered: 0,
                        late: 0,
                        failure: None,
                    };
                    let mut clock_start: Option<Instant> = None;

                    for slot in slot_rx.iter() {
                        pending.insert(slot.index(), slot);

                        while let Some(slot) = pending.remove(&next) {
                            next += 1;
                            let _ = credit_tx.send(());

                            let frame = match slot {
                                Slot::Rendered(frame) => frame,
                                Slot::Skipped(_) => continue,
                                Slot::Failed(index, message) => {
                                    warn!("Render worker failed on frame {}: {}", index, message);
                                    if delivery.failure.is_none() {
                                        delivery.failure = Some(RenderError::Worker { frame: index, message });
                                    }
                                    stop_ref.store(true, Ordering::Relaxed);
                                    continue;
                                }
                            };
                            if stop_ref.load(Ordering::Relaxed) {
                                continue;
                            }
                            if cancel.is_cancelled() {
                                stop_ref.store(true, Ordering::Relaxed);
                                continue;
                            }

                            if realtime {
                                let start = *clock_start.get_or_insert_with(Instant::now);
                                let due = start + Duration::from_secs_f64(frame.timestamp());
                                let now = Instant::now();
                                if now < due {
                                    thread::sleep(due - now);
                                } else if now - due > Duration::from_secs_f64(1.0 / fps as f64) {
                                    delivery.late += 1;
                                    trace!("Frame {} is {:.2?} late", frame.index(), now - due);
                                }
                            }

                            let index = frame.index();
                            match sink.push(frame) {
                                Ok(()) => {
                                    delivery.delivered += 1;
                                    trace!("Delivered frame {}", index);
                                    self.report(delivery.delivered, total_frames, RenderStage::Rendering);
                                }
                                Err(e) => {
                                    warn!("Sink rejected frame {}: {}", index, e);
                                    delivery.failure = Some(e.into());
                                    stop_ref.store(true, Ordering::Relaxed);
                                }
                            }
                        }
                    }
                    delivery
                });

            // Dispatch on the calling thread, one credit per frame
            for index in 0..total_frames {
                if cancel.is_cancelled() || stop.load(Ordering::Relaxed) {
                    break;
                }
                if credit_rx.recv().is_err() {
                    break;
                }
                if job_tx.send(index).is_err() {
                    break;
                }
            }
            drop(job_tx);

            match consumer {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Delivery::failed(SinkError::Closed.into())),
                Err(e) => Delivery::failed(SinkError::Io(e).into()),
            }
        })
    }

    /// Abort the sink and report `e`.
    fn fail(&self, sink: &mut dyn FrameSink, e: RenderError, delivered: u64, total: u64) -> RenderError {
        warn!("Render failed after {} frames: {}", delivered, e);
        sink.abort();
        self.report(delivered, total, RenderStage::Error(e.to_string()));
        e
    }

    fn report(&self, current_frame: u64, total_frames: u64, stage: RenderStage) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(RenderProgress {
                current_frame,
                total_frames,
                stage,
            });
        }
    }
}
