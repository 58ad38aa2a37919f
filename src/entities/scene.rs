//! Scene definition: background, camera, cast and schedule.
//!
//! World coordinates are background pixels with the origin at the top-left
//! corner and +y pointing down. Times are seconds.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::actor::{ActorDefinition, ActorId, ImageHandle};

/// Axis-aligned rectangle in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        Self {
            origin: center - size * 0.5,
            size,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.origin + self.size * 0.5
    }

    pub fn max(&self) -> Vec2 {
        self.origin + self.size
    }

    /// True when the two rectangles share a non-empty area.
    pub fn intersects(&self, other: &Rect) -> bool {
        let a_max = self.max();
        let b_max = other.max();
        self.origin.x < b_max.x
            && other.origin.x < a_max.x
            && self.origin.y < b_max.y
            && other.origin.y < a_max.y
    }
}

/// Initial viewport plus framing policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub viewport: Rect,
    /// Keep the viewport inside the background bounds.
    #[serde(default)]
    pub clamp_to_background: bool,
}

impl CameraSpec {
    pub fn new(viewport: Rect) -> Self {
        Self {
            viewport,
            clamp_to_background: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraMovementKind {
    /// Viewport centre tracks the actor's resolved position.
    FollowActor { actor: ActorId, duration: f64 },
    /// Viewport translates linearly by `offset`.
    ManualOffset { offset: Vec2, duration: f64 },
}

impl CameraMovementKind {
    pub fn duration(&self) -> f64 {
        match self {
            CameraMovementKind::FollowActor { duration, .. }
            | CameraMovementKind::ManualOffset { duration, .. } => *duration,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraMovement {
    /// Absolute start time; `None` chains the movement right after the previous one.
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(flatten)]
    pub kind: CameraMovementKind,
}

impl CameraMovement {
    pub fn follow(actor: impl Into<ActorId>, duration: f64) -> Self {
        Self {
            start: None,
            kind: CameraMovementKind::FollowActor {
                actor: actor.into(),
                duration,
            },
        }
    }

    pub fn pan(offset: Vec2, duration: f64) -> Self {
        Self {
            start: None,
            kind: CameraMovementKind::ManualOffset { offset, duration },
        }
    }

    pub fn starting_at(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Hold the default pose.
    Idle,
    /// Run the named action in a loop.
    ///
    /// Playback starts `start_offset` seconds into the looped component list
    /// and lasts `duration` seconds if set (the last cycle may be cut short),
    /// otherwise `repeat` full cycles.
    Action {
        action: String,
        #[serde(default = "default_repeat")]
        repeat: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        #[serde(default)]
        start_offset: f64,
    },
}

fn default_repeat() -> u32 {
    1
}

fn default_visible() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneActorEntry {
    pub actor: ActorId,
    #[serde(default)]
    pub start: f64,
    pub schedule: Schedule,
    /// Draw the actor while this entry's action plays.
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl SceneActorEntry {
    pub fn idle(actor: impl Into<ActorId>) -> Self {
        Self {
            actor: actor.into(),
            start: 0.0,
            schedule: Schedule::Idle,
            visible: true,
        }
    }

    pub fn action(actor: impl Into<ActorId>, action: impl Into<String>, start: f64) -> Self {
        Self {
            actor: actor.into(),
            start,
            schedule: Schedule::Action {
                action: action.into(),
                repeat: 1,
                duration: None,
                start_offset: 0.0,
            },
            visible: true,
        }
    }

    pub fn repeated(mut self, times: u32) -> Self {
        if let Schedule::Action { repeat, .. } = &mut self.schedule {
            *repeat = times;
        }
        self
    }

    /// Loop the action for exactly `seconds`, overriding `repeat`.
    pub fn lasting(mut self, seconds: f64) -> Self {
        if let Schedule::Action { duration, .. } = &mut self.schedule {
            *duration = Some(seconds);
        }
        self
    }

    /// Start `seconds` into the action instead of at its first component.
    pub fn offset_by(mut self, seconds: f64) -> Self {
        if let Schedule::Action { start_offset, .. } = &mut self.schedule {
            *start_offset = seconds;
        }
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// An actor placed in a scene at a starting position.
#[derive(Clone, Debug, PartialEq)]
pub struct CastMember {
    pub actor: ActorDefinition,
    pub origin: Vec2,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneDefinition {
    pub name: String,
    pub background: ImageHandle,
    pub camera: CameraSpec,
    pub camera_moves: Vec<CameraMovement>,
    pub cast: Vec<CastMember>,
    pub entries: Vec<SceneActorEntry>,
}

impl SceneDefinition {
    pub fn new(name: impl Into<String>, background: ImageHandle, camera: CameraSpec) -> Self {
        Self {
            name: name.into(),
            background,
            camera,
            camera_moves: Vec::new(),
            cast: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn cast_actor(&mut self, actor: ActorDefinition, origin: Vec2) -> &mut Self {
        self.cast.push(CastMember { actor, origin });
        self
    }

    pub fn schedule(&mut self, entry: SceneActorEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn move_camera(&mut self, movement: CameraMovement) -> &mut Self {
        self.camera_moves.push(movement);
        self
    }

    pub fn cast_member(&self, id: &ActorId) -> Option<&CastMember> {
        self.cast.iter().find(|m| &m.actor.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersects() {
        let a = Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
        assert!(a.intersects(&Rect::new(Vec2::new(9.0, 9.0), Vec2::new(5.0, 5.0))));
        // Touching edges share no area
        assert!(!a.intersects(&Rect::new(Vec2::new(10.0, 0.0), Vec2::new(5.0, 5.0))));
        assert!(!a.intersects(&Rect::new(Vec2::new(-6.0, 0.0), Vec2::new(5.0, 5.0))));
    }

    #[test]
    fn test_rect_center() {
        let r = Rect::from_center(Vec2::new(50.0, 40.0), Vec2::new(20.0, 10.0));
        assert_eq!(r.origin, Vec2::new(40.0, 35.0));
        assert_eq!(r.center(), Vec2::new(50.0, 40.0));
    }

    #[test]
    fn test_camera_movement_json() {
        let json = r#"{"type":"follow_actor","actor":"hero","duration":2.0,"start":1.0}"#;
        let m: CameraMovement = serde_json::from_str(json).unwrap();
        assert_eq!(m, CameraMovement::follow("hero", 2.0).starting_at(1.0));
    }

    #[test]
    fn test_entry_json_defaults() {
        let json = r#"{"actor":"hero","schedule":{"type":"action","action":"walk"}}"#;
        let e: SceneActorEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e, SceneActorEntry::action("hero", "walk", 0.0));

        let json = r#"{"actor":"hero","start":2.5,"schedule":{"type":"idle"},"visible":false}"#;
        let e: SceneActorEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.schedule, Schedule::Idle);
        assert!(!e.visible);
    }

    #[test]
    fn test_entry_json_window() {
        let json = r#"{"actor":"hero","start":1.0,
            "schedule":{"type":"action","action":"walk","duration":2.5,"start_offset":0.5}}"#;
        let e: SceneActorEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e, SceneActorEntry::action("hero", "walk", 1.0).lasting(2.5).offset_by(0.5));
    }
}
