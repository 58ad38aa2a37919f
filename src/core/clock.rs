//! SceneClock - evaluates every actor's pose and the camera viewport at time t.
//!
//! Lookups binary-search the resolved tracks. Sequential playback should go
//! through a [`ClockCursor`], which remembers the last segment of every track so
//! that advancing to the next frame costs O(1) per track.
//!
//! Follow-camera segments read the tracked actor's pose computed in the same
//! call, so the viewport always reflects the live pose. Times past the end of
//! the scene hold the final pose.

use glam::Vec2;
use std::sync::Arc;

use super::timeline::ResolvedTimeline;
use crate::entities::actor::ActorId;
use crate::entities::scene::Rect;

/// Position, sprite frame and visibility of one actor at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub sprite_frame: usize,
    /// Authored visibility. [`Compositor::cull`](super::compositor::Compositor::cull)
    /// also clears it for actors outside the viewport.
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorPose {
    pub actor: ActorId,
    pub pose: Pose,
}

/// Everything the compositor needs for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseSet {
    pub time: f64,
    /// Draw order: first entry is drawn first (bottom).
    pub actors: Vec<ActorPose>,
    pub viewport: Rect,
}

impl PoseSet {
    pub fn actor(&self, id: &ActorId) -> Option<&Pose> {
        self.actors.iter().find(|a| &a.actor == id).map(|a| &a.pose)
    }
}

/// Last segment index per track, for monotonic playback.
#[derive(Clone, Debug, Default)]
pub struct ClockCursor {
    actors: Vec<usize>,
    camera: usize,
}

#[derive(Clone, Debug)]
pub struct SceneClock {
    timeline: Arc<ResolvedTimeline>,
}

impl SceneClock {
    pub fn new(timeline: Arc<ResolvedTimeline>) -> Self {
        Self { timeline }
    }

    pub fn timeline(&self) -> &ResolvedTimeline {
        &self.timeline
    }

    pub fn cursor(&self) -> ClockCursor {
        ClockCursor {
            actors: vec![0; self.timeline.actors.len()],
            camera: 0,
        }
    }

    /// Poses at `t` by binary search.
    pub fn pose_at(&self, t: f64) -> PoseSet {
        self.evaluate(t, None)
    }

    /// Poses at `t`, continuing from `cursor`. Results are identical to
    /// [`SceneClock::pose_at`]; only the search cost differs.
    pub fn advance(&self, cursor: &mut ClockCursor, t: f64) -> PoseSet {
        if cursor.actors.len() != self.timeline.actors.len() {
            *cursor = self.cursor();
        }
        self.evaluate(t, Some(cursor))
    }

    fn evaluate(&self, t: f64, mut cursor: Option<&mut ClockCursor>) -> PoseSet {
        let tl = &*self.timeline;
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, tl.total_duration) };

        let mut actors = Vec::with_capacity(tl.actors.len());
        for (i, (id, track)) in tl.actors.iter().enumerate() {
            let index = match cursor.as_deref_mut() {
                Some(c) => {
                    c.actors[i] = track.track.locate_from(c.actors[i], t);
                    c.actors[i]
                }
                None => track.track.locate(t),
            };
            actors.push(ActorPose {
                actor: id.clone(),
                pose: track.sample_segment(index, t),
            });
        }

        let camera = &tl.camera;
        let cam_index = match cursor {
            Some(c) => {
                c.camera = camera.track.locate_from(c.camera, t);
                c.camera
            }
            None => camera.track.locate(t),
        };
        let mut origin = camera.sample_origin(cam_index, t, |id| {
            actors
                .iter()
                .find(|a| &a.actor == id)
                .map(|a| a.pose.position)
        });
        if camera.clamp_to_background {
            let bg = Vec2::new(tl.background.width() as f32, tl.background.height() as f32);
            origin = clamp_origin(origin, camera.viewport_size, bg);
        }

        PoseSet {
            time: t,
            actors,
            viewport: Rect::new(origin, camera.viewport_size),
        }
    }
}

/// Keep a viewport of `size` inside `[0, bounds]`; a viewport larger than the
/// bounds along an axis is pinned to 0 on that axis.
fn clamp_origin(origin: Vec2, size: Vec2, bounds: Vec2) -> Vec2 {
    let axis = |o: f32, s: f32, b: f32| if s >= b { 0.0 } else { o.clamp(0.0, b - s) };
    Vec2::new(
        axis(origin.x, size.x, bounds.x),
        axis(origin.y, size.y, bounds.y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::scene_with_hero;
    use crate::core::timeline::TimelineResolver;
    use crate::entities::scene::{CameraMovement, SceneActorEntry, SceneDefinition};
    use approx::assert_relative_eq;

    fn clock(scene: &SceneDefinition) -> SceneClock {
        SceneClock::new(Arc::new(TimelineResolver::new().resolve(scene).unwrap()))
    }

    /// Test: Actor scheduled only as idle while the camera moves
    /// Validates: Idle pose is constant across the whole scene
    #[test]
    fn test_idle_actor_is_constant() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .move_camera(CameraMovement::pan(Vec2::new(8.0, 0.0), 2.0));
        let clock = clock(&scene);

        let first = *clock.pose_at(0.0).actor(&"hero".into()).unwrap();
        assert_eq!(first.position, Vec2::new(16.0, 20.0));
        assert_eq!(first.sprite_frame, 0);
        for k in 0..=20 {
            let pose = *clock.pose_at(k as f64 * 0.1).actor(&"hero".into()).unwrap();
            assert_eq!(pose, first);
        }
    }

    /// Test: Camera follows the hero over [2, 5)
    /// Validates: Viewport centre equals the actor's position at every sample
    #[test]
    fn test_follow_tracks_actor() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::action("hero", "stroll", 2.0))
            .move_camera(CameraMovement::follow("hero", 3.0).starting_at(2.0));
        let clock = clock(&scene);

        for k in 0..30 {
            let t = 2.0 + k as f64 * 0.1;
            let poses = clock.pose_at(t);
            let hero = poses.actor(&"hero".into()).unwrap();
            let center = poses.viewport.center();
            assert_relative_eq!(center.x, hero.position.x, epsilon = 1e-4);
            assert_relative_eq!(center.y, hero.position.y, epsilon = 1e-4);
        }

        // Before the follow starts the camera holds its initial viewport
        assert_eq!(clock.pose_at(1.0).viewport.origin, Vec2::ZERO);
    }

    #[test]
    fn test_interpolated_position() {
        let mut scene = scene_with_hero();
        scene.schedule(SceneActorEntry::action("hero", "stroll", 0.0));
        let clock = clock(&scene);

        let at = |t: f64| *clock.pose_at(t).actor(&"hero".into()).unwrap();
        assert_eq!(at(0.5).position, Vec2::new(21.0, 20.0));
        assert_eq!(at(0.5).sprite_frame, 1);
        // Pause beat
        assert_eq!(at(1.25).position, Vec2::new(26.0, 20.0));
        assert_eq!(at(1.25).sprite_frame, 2);
        assert_eq!(at(3.0).position, Vec2::new(26.0, 50.0));
    }

    #[test]
    fn test_hold_last_frame() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::action("hero", "step", 0.0))
            .move_camera(CameraMovement::pan(Vec2::new(3.0, 4.0), 1.0));
        let clock = clock(&scene);

        let end = clock.pose_at(1.0);
        let late = clock.pose_at(100.0);
        assert_eq!(late.actors, end.actors);
        assert_eq!(late.viewport, end.viewport);
        assert_eq!(late.viewport.origin, Vec2::new(3.0, 4.0));
        assert_eq!(clock.pose_at(-3.0).viewport.origin, Vec2::ZERO);
    }

    #[test]
    fn test_cursor_matches_search() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::action("hero", "stroll", 0.3))
            .schedule(SceneActorEntry::action("hero", "step", 3.5))
            .move_camera(CameraMovement::pan(Vec2::new(4.0, 0.0), 1.0).starting_at(0.7))
            .move_camera(CameraMovement::follow("hero", 2.0));
        let clock = clock(&scene);

        let mut cursor = clock.cursor();
        for k in 0..=45 {
            let t = k as f64 / 10.0;
            assert_eq!(clock.advance(&mut cursor, t), clock.pose_at(t), "t={}", t);
        }
    }

    #[test]
    fn test_hidden_action() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::action("hero", "step", 0.0).hidden())
            .schedule(SceneActorEntry::action("hero", "step", 2.0));
        let clock = clock(&scene);

        assert!(!clock.pose_at(0.5).actor(&"hero".into()).unwrap().visible);
        // Idle between actions is visible again
        assert!(clock.pose_at(1.5).actor(&"hero".into()).unwrap().visible);
    }

    #[test]
    fn test_clamp_to_background() {
        let mut scene = scene_with_hero();
        scene.camera.clamp_to_background = true;
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .move_camera(CameraMovement::pan(Vec2::new(100.0, -50.0), 1.0));
        let clock = clock(&scene);

        // Background is 64x48, viewport 32x24
        assert_eq!(clock.pose_at(1.0).viewport.origin, Vec2::new(32.0, 0.0));
    }

    #[test]
    fn test_clamp_origin_oversized_viewport() {
        let o = clamp_origin(Vec2::new(-5.0, 7.0), Vec2::new(100.0, 10.0), Vec2::new(50.0, 20.0));
        assert_eq!(o, Vec2::new(0.0, 7.0));
    }
}
