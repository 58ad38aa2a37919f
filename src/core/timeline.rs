//! TimelineResolver - turns a scene definition into immutable resolved tracks.
//!
//! Each actor gets a track of contiguous, non-overlapping segments covering
//! `[0, total_duration]`: one segment per scheduled action component, and idle
//! segments for every stretch of time without a scheduled action. The camera
//! gets a track of the same shape made of follow/pan segments and static holds.
//!
//! Resolution is a pure function of its input. Resolving the same scene twice
//! yields equal timelines, which is what keeps preview and export in sync:
//! every render pass works from its own freshly resolved snapshot.

use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, trace};

use super::clock::Pose;
use super::motion::{MotionModel, interpolate};
use crate::entities::actor::{ActionComponent, ActorId, ImageHandle, SpriteSheet};
use crate::entities::error::{ResolveError, SchemaError};
use crate::entities::scene::{CameraMovementKind, CastMember, SceneActorEntry, SceneDefinition, Schedule};
use crate::entities::speed::SpeedTable;

/// Slack for comparing accumulated float times.
pub const TIME_EPSILON: f64 = 1e-9;

/// Concrete time window `[start, end)` in which one component or camera movement is active.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSegment<K> {
    pub start: f64,
    pub end: f64,
    /// Position (actor) or viewport origin (camera) when the segment starts.
    pub origin: Vec2,
    pub kind: K,
}

impl<K> ResolvedSegment<K> {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Time offset of `t` inside this segment, never negative.
    pub fn elapsed(&self, t: f64) -> f64 {
        (t - self.start).max(0.0)
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActorSegmentKind {
    Idle,
    Action {
        action: String,
        component_index: usize,
        component: ActionComponent,
        visible: bool,
        /// Time into the component when the segment starts (non-zero when
        /// playback begins mid-component).
        phase: f64,
        /// Full duration of the component. Differs from the segment duration
        /// when the segment is a cut-down part of it.
        span: f64,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CameraSegmentKind {
    /// Implicit static hold (leading gaps, gaps between movements, tail).
    Hold,
    Follow { actor: ActorId },
    Pan { offset: Vec2 },
}

/// Sorted, contiguous segments.
#[derive(Clone, Debug, PartialEq)]
pub struct Track<K> {
    segments: Vec<ResolvedSegment<K>>,
}

impl<K> Track<K> {
    fn new(segments: Vec<ResolvedSegment<K>>) -> Self {
        debug_assert!(!segments.is_empty());
        Self { segments }
    }

    pub fn segments(&self) -> &[ResolvedSegment<K>] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> &ResolvedSegment<K> {
        &self.segments[index]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn end(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.end)
    }

    /// Index of the segment active at `t`. Times before the first segment map
    /// to the first one, times past the end map to the last one.
    pub fn locate(&self, t: f64) -> usize {
        self.segments
            .partition_point(|s| s.start <= t)
            .saturating_sub(1)
    }

    /// Like [`Track::locate`], starting from a previous answer. Cheap when `t`
    /// advances monotonically, falls back to binary search otherwise.
    pub fn locate_from(&self, hint: usize, t: f64) -> usize {
        const MAX_WALK: usize = 4;

        let Some(seg) = self.segments.get(hint) else {
            return self.locate(t);
        };
        if seg.start > t {
            return self.locate(t);
        }

        let mut idx = hint;
        for _ in 0..MAX_WALK {
            match self.segments.get(idx + 1) {
                Some(next) if next.start <= t => idx += 1,
                _ => return idx,
            }
        }
        self.locate(t)
    }
}

/// Resolved schedule of one actor.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorTrack {
    pub actor: ActorId,
    pub sprite_sheet: SpriteSheet,
    pub idle_frame: usize,
    pub track: Track<ActorSegmentKind>,
}

impl ActorTrack {
    /// Pose at `t`, searching the track.
    pub fn sample(&self, t: f64) -> Pose {
        self.sample_segment(self.track.locate(t), t)
    }

    /// Pose at `t` given the index of the segment active at `t`.
    pub fn sample_segment(&self, index: usize, t: f64) -> Pose {
        let seg = self.track.segment(index);
        match &seg.kind {
            ActorSegmentKind::Idle => Pose {
                position: seg.origin,
                sprite_frame: self.idle_frame,
                visible: true,
            },
            ActorSegmentKind::Action {
                component,
                visible,
                phase,
                span,
                ..
            } => {
                let offset = component.motion.offset();
                let elapsed = seg.elapsed(t).min(seg.duration());
                let moved = interpolate(offset, *span, phase + elapsed) - interpolate(offset, *span, *phase);
                Pose {
                    position: seg.origin + moved,
                    sprite_frame: component.sprite,
                    visible: *visible,
                }
            }
        }
    }
}

/// Resolved camera movements.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraTrack {
    pub viewport_size: Vec2,
    pub clamp_to_background: bool,
    pub track: Track<CameraSegmentKind>,
}

impl CameraTrack {
    /// Unclamped viewport origin at `t` inside segment `index`. `follow` yields
    /// the current position of a followed actor.
    pub fn sample_origin<F>(&self, index: usize, t: f64, follow: F) -> Vec2
    where
        F: FnOnce(&ActorId) -> Option<Vec2>,
    {
        let seg = self.track.segment(index);
        match &seg.kind {
            CameraSegmentKind::Hold => seg.origin,
            CameraSegmentKind::Pan { offset } => {
                seg.origin + interpolate(*offset, seg.duration(), seg.elapsed(t))
            }
            CameraSegmentKind::Follow { actor } => follow(actor)
                .map(|center| center - self.viewport_size * 0.5)
                .unwrap_or(seg.origin),
        }
    }
}

/// Immutable result of one resolution pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTimeline {
    pub scene_name: String,
    pub background: ImageHandle,
    /// Actor tracks in draw order (first declared is drawn first).
    pub actors: IndexMap<ActorId, ActorTrack>,
    pub camera: CameraTrack,
    pub total_duration: f64,
}

impl ResolvedTimeline {
    pub fn actor(&self, id: &ActorId) -> Option<&ActorTrack> {
        self.actors.get(id)
    }

    /// Number of frames at `fps`, including both the t=0 and t=total frames.
    pub fn frame_count(&self, fps: u32) -> u64 {
        if fps == 0 {
            return 0;
        }
        (self.total_duration * fps as f64 + TIME_EPSILON).floor() as u64 + 1
    }
}

/// Scene time of frame `index` at `fps`.
pub fn frame_time(index: u64, fps: u32) -> f64 {
    index as f64 / fps as f64
}

/// Scheduled (non-idle) interval of one actor, pre-expanded.
struct Interval<'a> {
    start: f64,
    end: f64,
    entry: &'a SceneActorEntry,
    action: &'a str,
    /// Playback position in the looped component list at `start`.
    offset: f64,
    cycle: f64,
    beats: Vec<(usize, ActionComponent, f64)>,
}

/// Camera window before origins are known.
struct CameraWindow {
    start: f64,
    end: f64,
    kind: CameraSegmentKind,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TimelineResolver {
    motion: MotionModel,
}

impl TimelineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed_table(table: SpeedTable) -> Self {
        Self {
            motion: MotionModel::new(table),
        }
    }

    pub fn motion(&self) -> &MotionModel {
        &self.motion
    }

    /// Resolve `scene` into per-actor and camera tracks plus the total duration.
    ///
    /// # Errors
    ///
    /// - `SchemaError::OverlappingSchedule`: two actions of one actor, or two camera movements, overlap
    /// - `SchemaError::EmptyAction`: a scheduled action has no components
    /// - `SchemaError::UnresolvedReference`: unknown actor, action, follow target or sprite frame
    /// - `MotionError::InvalidComponent`: a component's duration cannot be derived
    pub fn resolve(&self, scene: &SceneDefinition) -> Result<ResolvedTimeline, ResolveError> {
        debug!(
            "Resolving scene '{}': {} cast, {} entries, {} camera moves",
            scene.name,
            scene.cast.len(),
            scene.entries.len(),
            scene.camera_moves.len()
        );

        let cast = index_cast(scene)?;

        // Group entries per actor, keeping first-declaration order (z-order)
        let mut grouped: IndexMap<ActorId, Vec<&SceneActorEntry>> = IndexMap::new();
        for entry in &scene.entries {
            if !cast.contains_key(&entry.actor) {
                return Err(SchemaError::UnresolvedReference(format!("actor '{}'", entry.actor)).into());
            }
            check_time(entry.start, || format!("start of an entry for actor '{}'", entry.actor))?;
            grouped.entry(entry.actor.clone()).or_default().push(entry);
        }

        let mut schedules: IndexMap<ActorId, Vec<Interval<'_>>> = IndexMap::new();
        for (id, entries) in &grouped {
            let member = cast[id];
            schedules.insert(id.clone(), self.expand_schedule(member, entries)?);
        }

        let windows = camera_windows(scene, &grouped)?;

        let actors_end = schedules
            .values()
            .flat_map(|ivs| ivs.iter().map(|iv| iv.end))
            .fold(0.0, f64::max);
        let camera_end = windows.last().map_or(0.0, |w| w.end);
        let total_duration = actors_end.max(camera_end);

        let mut actors = IndexMap::new();
        for (id, intervals) in &schedules {
            let member = cast[id];
            let track = build_actor_track(member, intervals, total_duration);
            trace!("Actor '{}': {} segments", id, track.len());
            actors.insert(
                id.clone(),
                ActorTrack {
                    actor: id.clone(),
                    sprite_sheet: member.actor.sprite_sheet.clone(),
                    idle_frame: member.actor.idle_frame,
                    track,
                },
            );
        }

        let camera = build_camera_track(scene, windows, total_duration, &actors);
        debug!(
            "Scene '{}' resolved: {} actors, {} camera segments, {:.3}s",
            scene.name,
            actors.len(),
            camera.track.len(),
            total_duration
        );

        Ok(ResolvedTimeline {
            scene_name: scene.name.clone(),
            background: scene.background.clone(),
            actors,
            camera,
            total_duration,
        })
    }

    /// Validate one actor's entries and expand them into sorted intervals.
    fn expand_schedule<'a>(
        &self,
        member: &'a CastMember,
        entries: &[&'a SceneActorEntry],
    ) -> Result<Vec<Interval<'a>>, ResolveError> {
        let actor = &member.actor;
        let mut intervals = Vec::new();

        for &entry in entries {
            let Schedule::Action {
                action,
                repeat,
                duration,
                start_offset,
            } = &entry.schedule
            else {
                continue;
            };
            let def = actor.action(action).ok_or_else(|| {
                SchemaError::UnresolvedReference(format!("action '{}' of actor '{}'", action, actor.id))
            })?;
            if def.components.is_empty() {
                return Err(SchemaError::EmptyAction {
                    actor: actor.id.to_string(),
                    action: action.clone(),
                }
                .into());
            }
            if *repeat == 0 {
                return Err(SchemaError::InvalidRepeat {
                    actor: actor.id.to_string(),
                    action: action.clone(),
                }
                .into());
            }

            let mut beats = Vec::with_capacity(def.components.len());
            for (i, component) in def.components.iter().enumerate() {
                check_sprite(&actor.sprite_sheet, component.sprite, || {
                    format!("sprite {} in action '{}' of actor '{}'", component.sprite, action, actor.id)
                })?;
                beats.push((i, *component, self.motion.duration_of(component)?));
            }

            check_time(*start_offset, || {
                format!("start offset of action '{}' of actor '{}'", action, actor.id)
            })?;
            let cycle: f64 = beats.iter().map(|(_, _, d)| d).sum();

            let end = match duration {
                Some(d) if d.is_finite() && *d > 0.0 => entry.start + d,
                Some(d) => {
                    return Err(SchemaError::InvalidTime {
                        owner: format!("duration of action '{}' of actor '{}'", action, actor.id),
                        value: *d,
                    }
                    .into());
                }
                None => {
                    // Accumulate exactly the way full components are laid out
                    let mut end = entry.start;
                    for _ in 0..*repeat {
                        for (_, _, d) in &beats {
                            end += d;
                        }
                    }
                    end
                }
            };

            intervals.push(Interval {
                start: entry.start,
                end,
                entry,
                action: action.as_str(),
                offset: *start_offset,
                cycle,
                beats,
            });
        }

        intervals.sort_by(|a, b| a.start.total_cmp(&b.start));
        for pair in intervals.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.start < a.end - TIME_EPSILON {
                return Err(SchemaError::OverlappingSchedule {
                    owner: format!("actor '{}'", actor.id),
                    first: (a.start, a.end),
                    second: (b.start, b.end),
                }
                .into());
            }
        }

        Ok(intervals)
    }
}

fn index_cast(scene: &SceneDefinition) -> Result<IndexMap<ActorId, &CastMember>, SchemaError> {
    let mut cast = IndexMap::new();
    for member in &scene.cast {
        let id = &member.actor.id;
        if cast.insert(id.clone(), member).is_some() {
            return Err(SchemaError::DuplicateActor(id.to_string()));
        }
        check_sprite(&member.actor.sprite_sheet, member.actor.idle_frame, || {
            format!("idle sprite {} of actor '{}'", member.actor.idle_frame, id)
        })?;
        let actions = &member.actor.actions;
        for (i, action) in actions.iter().enumerate() {
            if actions[..i].iter().any(|a| a.name == action.name) {
                return Err(SchemaError::DuplicateAction {
                    actor: id.to_string(),
                    action: action.name.clone(),
                });
            }
        }
    }
    Ok(cast)
}

fn check_time(value: f64, owner: impl FnOnce() -> String) -> Result<(), SchemaError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SchemaError::InvalidTime { owner: owner(), value })
    }
}

fn check_sprite(
    sheet: &SpriteSheet,
    index: usize,
    what: impl FnOnce() -> String,
) -> Result<(), SchemaError> {
    if index < sheet.len() {
        Ok(())
    } else {
        Err(SchemaError::UnresolvedReference(what()))
    }
}

/// Lay out camera movements on the time axis, filling gaps with holds.
fn camera_windows(
    scene: &SceneDefinition,
    grouped: &IndexMap<ActorId, Vec<&SceneActorEntry>>,
) -> Result<Vec<CameraWindow>, SchemaError> {
    let mut windows: Vec<CameraWindow> = Vec::new();
    let mut cursor = 0.0;

    for (i, movement) in scene.camera_moves.iter().enumerate() {
        let duration = movement.kind.duration();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SchemaError::InvalidTime {
                owner: format!("duration of camera movement #{}", i),
                value: duration,
            });
        }

        let mut start = movement.start.unwrap_or(cursor);
        check_time(start, || format!("start of camera movement #{}", i))?;

        if start < cursor - TIME_EPSILON {
            let prev = windows.last().map_or((0.0, cursor), |w| (w.start, w.end));
            return Err(SchemaError::OverlappingSchedule {
                owner: "camera".to_string(),
                first: prev,
                second: (start, start + duration),
            });
        }
        if start > cursor + TIME_EPSILON {
            trace!("Camera gap [{:.3}, {:.3}) filled with a hold", cursor, start);
            windows.push(CameraWindow {
                start: cursor,
                end: start,
                kind: CameraSegmentKind::Hold,
            });
        } else {
            start = cursor;
        }

        let kind = match &movement.kind {
            CameraMovementKind::FollowActor { actor, .. } => {
                if !grouped.contains_key(actor) {
                    return Err(SchemaError::UnresolvedReference(format!(
                        "camera follow target '{}'",
                        actor
                    )));
                }
                CameraSegmentKind::Follow { actor: actor.clone() }
            }
            CameraMovementKind::ManualOffset { offset, .. } => CameraSegmentKind::Pan { offset: *offset },
        };

        cursor = start + duration;
        windows.push(CameraWindow {
            start,
            end: cursor,
            kind,
        });
    }

    Ok(windows)
}

fn build_actor_track(member: &CastMember, intervals: &[Interval<'_>], total: f64) -> Track<ActorSegmentKind> {
    let mut segments = Vec::new();
    let mut position = member.origin;
    let mut cursor = 0.0;

    for iv in intervals {
        let mut t = if iv.start > cursor + TIME_EPSILON {
            segments.push(ResolvedSegment {
                start: cursor,
                end: iv.start,
                origin: position,
                kind: ActorSegmentKind::Idle,
            });
            iv.start
        } else {
            // Touching the previous action (or t=0)
            iv.start.max(cursor)
        };

        let (mut beat, mut phase) = seek(&iv.beats, iv.offset % iv.cycle);
        let window_end = iv.end;
        while t < window_end - TIME_EPSILON {
            let (index, component, span) = &iv.beats[beat];
            let natural_end = t + (span - phase);
            let cut = natural_end > window_end + TIME_EPSILON;
            let end = if natural_end >= window_end - TIME_EPSILON {
                window_end
            } else {
                natural_end
            };

            segments.push(ResolvedSegment {
                start: t,
                end,
                origin: position,
                kind: ActorSegmentKind::Action {
                    action: iv.action.to_string(),
                    component_index: *index,
                    component: *component,
                    visible: iv.entry.visible,
                    phase,
                    span: *span,
                },
            });

            let offset = component.motion.offset();
            position += if cut || phase > 0.0 {
                interpolate(offset, *span, phase + (end - t)) - interpolate(offset, *span, phase)
            } else {
                offset
            };
            t = end;
            beat = (beat + 1) % iv.beats.len();
            phase = 0.0;
        }
        cursor = t;
    }

    if cursor < total || segments.is_empty() {
        segments.push(ResolvedSegment {
            start: cursor,
            end: total.max(cursor),
            origin: position,
            kind: ActorSegmentKind::Idle,
        });
    }

    Track::new(segments)
}

/// Component index and time into it for a playback position inside one cycle.
fn seek(beats: &[(usize, ActionComponent, f64)], position: f64) -> (usize, f64) {
    let mut remaining = position.max(0.0);
    for (i, (_, _, duration)) in beats.iter().enumerate() {
        if remaining < duration - TIME_EPSILON {
            return (i, remaining);
        }
        remaining -= duration;
    }
    (0, 0.0)
}

fn build_camera_track(
    scene: &SceneDefinition,
    windows: Vec<CameraWindow>,
    total: f64,
    actors: &IndexMap<ActorId, ActorTrack>,
) -> CameraTrack {
    let size = scene.camera.viewport.size;
    let mut camera = CameraTrack {
        viewport_size: size,
        clamp_to_background: scene.camera.clamp_to_background,
        track: Track { segments: Vec::new() },
    };

    let mut origin = scene.camera.viewport.origin;
    let mut cursor = 0.0;
    for window in windows {
        camera.track.segments.push(ResolvedSegment {
            start: window.start,
            end: window.end,
            origin,
            kind: window.kind,
        });
        // Chain: the next segment starts wherever this one leaves the viewport
        let last = camera.track.segments.len() - 1;
        origin = camera.sample_origin(last, window.end, |id| {
            actors.get(id).map(|a| a.sample(window.end).position)
        });
        cursor = window.end;
    }

    if cursor < total || camera.track.segments.is_empty() {
        camera.track.segments.push(ResolvedSegment {
            start: cursor,
            end: total.max(cursor),
            origin,
            kind: CameraSegmentKind::Hold,
        });
    }

    camera
}
