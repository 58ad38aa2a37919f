//! Core engine - timeline resolution, scene clock, compositing and the frame driver.
//!
//! Data flows one way:
//! `SceneDefinition → TimelineResolver → ResolvedTimeline → SceneClock → PoseSet
//! → Compositor → Frame → FrameDriver → FrameSink`.

pub mod clock;
pub mod compositor;
pub mod driver;
pub mod motion;
pub mod timeline;

// Re-exports for convenience
pub use clock::{ActorPose, ClockCursor, Pose, PoseSet, SceneClock};
pub use compositor::Compositor;
pub use driver::{
    CancelToken, FrameDriver, RenderConfig, RenderError, RenderMode, RenderOutcome, RenderProgress, RenderStage,
};
pub use motion::MotionModel;
pub use timeline::{ResolvedTimeline, TimelineResolver, frame_time};

/// Shared scenes for core tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use glam::Vec2;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    use crate::entities::actor::{
        ActionComponent, ActionDefinition, ActorDefinition, Direction, Motion, SpriteSheet,
    };
    use crate::entities::scene::{CameraSpec, Rect, SceneDefinition};
    use crate::entities::speed::SpeedTier;

    pub const BG: Rgba<u8> = Rgba([40, 90, 40, 255]);
    pub const HERO_COLORS: [Rgba<u8>; 3] = [
        Rgba([255, 0, 0, 255]),
        Rgba([0, 255, 0, 255]),
        Rgba([0, 0, 255, 255]),
    ];
    pub const VILLAIN_COLOR: Rgba<u8> = Rgba([250, 250, 0, 255]);

    /// 64x48 background, 32x24 viewport at the origin, no clamping.
    pub fn viewport_scene() -> SceneDefinition {
        let background = Arc::new(RgbaImage::from_pixel(64, 48, BG));
        let camera = CameraSpec::new(Rect::new(Vec2::ZERO, Vec2::new(32.0, 24.0)));
        SceneDefinition::new("fixture", background, camera)
    }

    /// Three 4x4 solid frames; idle on frame 0.
    pub fn hero() -> ActorDefinition {
        let frames = HERO_COLORS
            .iter()
            .map(|c| RgbaImage::from_pixel(4, 4, *c))
            .collect();
        ActorDefinition::new("hero", SpriteSheet::new(frames))
            .with_action(ActionDefinition::new(
                "step",
                vec![ActionComponent::manual(1, 1.0, Vec2::new(10.0, 0.0))],
            ))
            .with_action(ActionDefinition::new(
                "stroll",
                vec![
                    ActionComponent::manual(1, 1.0, Vec2::new(10.0, 0.0)),
                    ActionComponent::pause(2, 0.5),
                    ActionComponent::manual(1, 1.5, Vec2::new(0.0, 30.0)),
                ],
            ))
            .with_action(ActionDefinition::new("nothing", vec![]))
            .with_action(ActionDefinition::new(
                "creep",
                vec![ActionComponent::new(
                    0,
                    Motion::walk(SpeedTier::EightTimesSlower, Direction::Right, 10.0),
                )],
            ))
    }

    pub fn villain() -> ActorDefinition {
        ActorDefinition::new(
            "villain",
            SpriteSheet::new(vec![RgbaImage::from_pixel(4, 4, VILLAIN_COLOR)]),
        )
    }

    /// `viewport_scene` with the hero cast at (16, 20).
    pub fn scene_with_hero() -> SceneDefinition {
        let mut scene = viewport_scene();
        scene.cast_actor(hero(), Vec2::new(16.0, 20.0));
        scene
    }
}
