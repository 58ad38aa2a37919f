//! Actors, their actions and the motion beats those actions are made of.
//!
//! Actors are immutable input for the duration of a render. Sprite sheets are
//! opaque shared handles to decoded RGBA frames; the engine only ever refers to
//! them by frame index.

use glam::Vec2;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::speed::SpeedTier;

/// Shared, already-decoded RGBA image (backgrounds, sprite frames).
pub type ImageHandle = Arc<RgbaImage>;

/// Actor identity, unique within a scene's cast.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ordered sprite frames for one actor.
#[derive(Clone, Debug, PartialEq)]
pub struct SpriteSheet {
    frames: Arc<[RgbaImage]>,
}

impl SpriteSheet {
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self { frames: frames.into() }
    }

    pub fn frame(&self, index: usize) -> Option<&RgbaImage> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Screen direction, +y pointing down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn unit(self) -> Vec2 {
        match self {
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Down => Vec2::new(0.0, 1.0),
        }
    }
}

/// How a component moves its actor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Motion {
    /// Travel `offset` at the speed of `tier`; duration = |offset| / speed.
    SpeedBased { tier: SpeedTier, offset: Vec2 },
    /// Travel `offset` over exactly `duration` seconds. A zero offset is a pause beat.
    Manual { duration: f64, offset: Vec2 },
}

impl Motion {
    /// Speed-based walk of `distance` pixels in `direction`.
    pub fn walk(tier: SpeedTier, direction: Direction, distance: f32) -> Self {
        Motion::SpeedBased {
            tier,
            offset: direction.unit() * distance,
        }
    }

    pub fn offset(&self) -> Vec2 {
        match self {
            Motion::SpeedBased { offset, .. } | Motion::Manual { offset, .. } => *offset,
        }
    }
}

/// One atomic motion beat: a sprite frame held while the motion plays.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionComponent {
    pub sprite: usize,
    pub motion: Motion,
}

impl ActionComponent {
    pub fn new(sprite: usize, motion: Motion) -> Self {
        Self { sprite, motion }
    }

    pub fn manual(sprite: usize, duration: f64, offset: Vec2) -> Self {
        Self::new(sprite, Motion::Manual { duration, offset })
    }

    pub fn pause(sprite: usize, duration: f64) -> Self {
        Self::manual(sprite, duration, Vec2::ZERO)
    }
}

/// Named, ordered sequence of components.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionDefinition {
    pub name: String,
    pub components: Vec<ActionComponent>,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>, components: Vec<ActionComponent>) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorDefinition {
    pub id: ActorId,
    pub sprite_sheet: SpriteSheet,
    /// Sprite frame shown while the actor is idle.
    pub idle_frame: usize,
    pub actions: Vec<ActionDefinition>,
}

impl ActorDefinition {
    pub fn new(id: impl Into<ActorId>, sprite_sheet: SpriteSheet) -> Self {
        Self {
            id: id.into(),
            sprite_sheet,
            idle_frame: 0,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    pub fn action(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_offset() {
        let m = Motion::walk(SpeedTier::Normal, Direction::Up, 96.0);
        assert_eq!(m.offset(), Vec2::new(0.0, -96.0));
    }

    #[test]
    fn test_action_lookup() {
        let sheet = SpriteSheet::new(vec![RgbaImage::new(1, 1)]);
        let actor = ActorDefinition::new("hero", sheet)
            .with_action(ActionDefinition::new("wave", vec![ActionComponent::pause(0, 1.0)]));
        assert!(actor.action("wave").is_some());
        assert!(actor.action("jump").is_none());
    }

    #[test]
    fn test_motion_json_shape() {
        let c = ActionComponent::manual(2, 1.5, Vec2::new(10.0, 0.0));
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"type\":\"manual\""));
        let back: ActionComponent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
