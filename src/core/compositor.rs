//! Frame compositor - draws background and actor sprites for one pose set.
//!
//! The viewport maps onto the output buffer with a translation plus an optional
//! uniform scale. When the output aspect ratio differs from the viewport's, the
//! picture is centred and the remaining border is filled with the clear colour.
//! Sampling is nearest-neighbour and sprites are alpha-blended in the order of
//! the pose set, so later-declared actors end up on top.
//!
//! Rendering is a pure function of its inputs: preview and export produce the
//! same bytes for the same timestamp.

use glam::Vec2;
use image::{Rgba, RgbaImage};
use log::trace;

use super::clock::{ActorPose, PoseSet};
use super::timeline::ResolvedTimeline;
use crate::entities::frame::Frame;
use crate::entities::scene::Rect;

/// Viewport → output pixel mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Projection {
    origin: Vec2,
    scale: f32,
    pad: Vec2,
}

impl Projection {
    fn new(viewport: &Rect, output: (u32, u32)) -> Self {
        let out = Vec2::new(output.0 as f32, output.1 as f32);
        let size = viewport.size.max(Vec2::splat(f32::EPSILON));
        let scale = (out.x / size.x).min(out.y / size.y);
        Self {
            origin: viewport.origin,
            scale,
            pad: (out - size * scale) * 0.5,
        }
    }

    fn to_output(&self, world: Vec2) -> Vec2 {
        (world - self.origin) * self.scale + self.pad
    }

    /// World position sampled by the centre of output pixel (x, y).
    fn to_world(&self, x: u32, y: u32) -> Vec2 {
        (Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - self.pad) / self.scale + self.origin
    }
}

/// CPU compositor producing RGBA8 frames.
#[derive(Clone, Debug)]
pub struct Compositor {
    output: (u32, u32),
    clear: Rgba<u8>,
}

impl Compositor {
    pub fn new(output: (u32, u32), clear: Rgba<u8>) -> Self {
        Self {
            output: (output.0.max(1), output.1.max(1)),
            clear,
        }
    }

    /// Output matching the timeline's viewport unless `output` overrides it.
    pub fn for_timeline(timeline: &ResolvedTimeline, output: Option<(u32, u32)>, clear: Rgba<u8>) -> Self {
        let size = timeline.camera.viewport_size;
        Self::new(
            output.unwrap_or((size.x.round() as u32, size.y.round() as u32)),
            clear,
        )
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output
    }

    /// Actors that are visible and overlap the viewport, in draw order.
    pub fn visible_actors<'a>(&self, poses: &'a PoseSet, timeline: &ResolvedTimeline) -> Vec<&'a ActorPose> {
        poses
            .actors
            .iter()
            .filter(|a| a.pose.visible)
            .filter(|a| {
                sprite_rect(a, timeline).is_some_and(|rect| rect.intersects(&poses.viewport))
            })
            .collect()
    }

    /// Clear `visible` on actors whose sprite lies entirely outside the
    /// viewport. Their positions are kept. Returns how many were culled.
    pub fn cull(&self, poses: &mut PoseSet, timeline: &ResolvedTimeline) -> usize {
        let viewport = poses.viewport;
        let mut culled = 0;
        for actor in poses.actors.iter_mut().filter(|a| a.pose.visible) {
            let on_screen = sprite_rect(actor, timeline).is_some_and(|rect| rect.intersects(&viewport));
            if !on_screen {
                actor.pose.visible = false;
                culled += 1;
            }
        }
        culled
    }

    /// Render frame `index` for `poses`.
    pub fn render(&self, poses: &PoseSet, timeline: &ResolvedTimeline, index: u64) -> Frame {
        let (width, height) = self.output;
        let proj = Projection::new(&poses.viewport, self.output);
        let mut image = RgbaImage::from_pixel(width, height, self.clear);

        self.draw_background(&mut image, &proj, &poses.viewport, &timeline.background);

        for actor in self.visible_actors(poses, timeline) {
            let Some(track) = timeline.actor(&actor.actor) else {
                continue;
            };
            let Some(sprite) = track.sprite_sheet.frame(actor.pose.sprite_frame) else {
                continue;
            };
            let rect = Rect::from_center(
                actor.pose.position,
                Vec2::new(sprite.width() as f32, sprite.height() as f32),
            );
            draw_sprite(&mut image, &proj, &poses.viewport, sprite, &rect);
        }

        trace!(
            "Composited frame {} at t={:.4} ({} actors)",
            index,
            poses.time,
            poses.actors.len()
        );
        Frame::from_image(index, poses.time, image)
    }

    fn draw_background(&self, image: &mut RgbaImage, proj: &Projection, viewport: &Rect, bg: &RgbaImage) {
        let (width, height) = image.dimensions();
        let content = output_bounds(proj, viewport, (width, height));

        // Source column/row per output pixel, None where the background has no pixel
        let cols: Vec<Option<u32>> = (0..width)
            .map(|x| sample_axis(proj.to_world(x, 0).x, bg.width()))
            .collect();
        let rows: Vec<Option<u32>> = (0..height)
            .map(|y| sample_axis(proj.to_world(0, y).y, bg.height()))
            .collect();

        for y in content.1.clone() {
            let Some(by) = rows[y as usize] else { continue };
            for x in content.0.clone() {
                let Some(bx) = cols[x as usize] else { continue };
                let dst = image.get_pixel_mut(x, y);
                *dst = blend_normal(*dst, *bg.get_pixel(bx, by));
            }
        }
    }
}

fn sprite_rect(actor: &ActorPose, timeline: &ResolvedTimeline) -> Option<Rect> {
    let sprite = timeline
        .actor(&actor.actor)?
        .sprite_sheet
        .frame(actor.pose.sprite_frame)?;
    Some(Rect::from_center(
        actor.pose.position,
        Vec2::new(sprite.width() as f32, sprite.height() as f32),
    ))
}

/// Nearest source index for world coordinate `w`, if inside `[0, len)`.
fn sample_axis(w: f32, len: u32) -> Option<u32> {
    let i = w.floor();
    if i >= 0.0 && i < len as f32 { Some(i as u32) } else { None }
}

/// Output pixel ranges covered by the viewport (excludes letterbox borders).
fn output_bounds(
    proj: &Projection,
    viewport: &Rect,
    (width, height): (u32, u32),
) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
    let lo = proj.to_output(viewport.origin);
    let hi = proj.to_output(viewport.max());
    let x0 = lo.x.round().clamp(0.0, width as f32) as u32;
    let x1 = hi.x.round().clamp(0.0, width as f32) as u32;
    let y0 = lo.y.round().clamp(0.0, height as f32) as u32;
    let y1 = hi.y.round().clamp(0.0, height as f32) as u32;
    (x0..x1, y0..y1)
}

fn draw_sprite(image: &mut RgbaImage, proj: &Projection, viewport: &Rect, sprite: &RgbaImage, rect: &Rect) {
    let (width, height) = image.dimensions();
    let content = output_bounds(proj, viewport, (width, height));

    let lo = proj.to_output(rect.origin);
    let hi = proj.to_output(rect.max());
    let x0 = (lo.x.floor().max(0.0) as u32).max(content.0.start);
    let x1 = (hi.x.ceil().min(width as f32).max(0.0) as u32).min(content.0.end);
    let y0 = (lo.y.floor().max(0.0) as u32).max(content.1.start);
    let y1 = (hi.y.ceil().min(height as f32).max(0.0) as u32).min(content.1.end);

    for y in y0..y1 {
        let Some(sy) = sample_axis(proj.to_world(0, y).y - rect.origin.y, sprite.height()) else {
            continue;
        };
        for x in x0..x1 {
            let Some(sx) = sample_axis(proj.to_world(x, 0).x - rect.origin.x, sprite.width()) else {
                continue;
            };
            let src = *sprite.get_pixel(sx, sy);
            if src[3] == 0 {
                continue;
            }
            let dst = image.get_pixel_mut(x, y);
            *dst = blend_normal(*dst, src);
        }
    }
}

/// Straight-alpha "normal" blend of `top` over `bottom`.
fn blend_normal(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = top[3] as f32 / 255.0;
    let inv_alpha = 1.0 - top_alpha;

    let channel = |b: u8, t: u8| -> u8 {
        let out = b as f32 / 255.0 * inv_alpha + t as f32 / 255.0 * top_alpha;
        (out.clamp(0.0, 1.0) * 255.0).round() as u8
    };
    let out_a = bottom[3] as f32 / 255.0 * inv_alpha + top_alpha;

    Rgba([
        channel(bottom[0], top[0]),
        channel(bottom[1], top[1]),
        channel(bottom[2], top[2]),
        (out_a.clamp(0.0, 1.0) * 255.0).round() as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SceneClock;
    use crate::core::fixtures::{BG, HERO_COLORS, scene_with_hero, villain};
    use crate::core::timeline::TimelineResolver;
    use crate::entities::scene::{CameraMovement, SceneActorEntry, SceneDefinition};
    use std::sync::Arc;

    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn render_at(scene: &SceneDefinition, t: f64, output: Option<(u32, u32)>) -> (Frame, PoseSet, Arc<ResolvedTimeline>) {
        let tl = Arc::new(TimelineResolver::new().resolve(scene).unwrap());
        let poses = SceneClock::new(tl.clone()).pose_at(t);
        let comp = Compositor::for_timeline(&tl, output, CLEAR);
        (comp.render(&poses, &tl, 0), poses, tl)
    }

    #[test]
    fn test_blend_normal() {
        let opaque = blend_normal(Rgba([10, 10, 10, 255]), Rgba([200, 100, 0, 255]));
        assert_eq!(opaque, Rgba([200, 100, 0, 255]));
        let clear = blend_normal(Rgba([10, 20, 30, 255]), Rgba([200, 100, 0, 0]));
        assert_eq!(clear, Rgba([10, 20, 30, 255]));
        let half = blend_normal(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(half[0], 128);
        assert_eq!(half[3], 255);
    }

    /// Test: Idle hero centred at (16, 20) in a 32x24 viewport at the origin
    /// Validates: Background fill and sprite placement relative to the viewport
    #[test]
    fn test_render_background_and_sprite() {
        let mut scene = scene_with_hero();
        scene.schedule(SceneActorEntry::idle("hero"));
        let (frame, _, _) = render_at(&scene, 0.0, None);

        assert_eq!(frame.resolution(), (32, 24));
        assert_eq!(*frame.image().get_pixel(0, 0), BG);
        // 4x4 sprite centred at (16, 20) covers [14, 18) x [18, 22)
        assert_eq!(*frame.image().get_pixel(14, 18), HERO_COLORS[0]);
        assert_eq!(*frame.image().get_pixel(17, 21), HERO_COLORS[0]);
        assert_eq!(*frame.image().get_pixel(18, 21), BG);
        assert_eq!(*frame.image().get_pixel(13, 18), BG);
    }

    #[test]
    fn test_viewport_translation() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .move_camera(CameraMovement::pan(Vec2::new(10.0, 4.0), 1.0));
        let (frame, _, _) = render_at(&scene, 1.0, None);

        // Sprite moves opposite to the camera
        assert_eq!(*frame.image().get_pixel(4, 14), HERO_COLORS[0]);
        assert_eq!(*frame.image().get_pixel(3, 14), BG);
    }

    #[test]
    fn test_uniform_scale_and_letterbox() {
        let mut scene = scene_with_hero();
        scene.schedule(SceneActorEntry::idle("hero"));
        // 2x scale horizontally fits 64, vertically would be 3x, so 2x wins: 64x48 centred in 64x60
        let (frame, _, _) = render_at(&scene, 0.0, Some((64, 60)));

        assert_eq!(frame.resolution(), (64, 60));
        assert_eq!(*frame.image().get_pixel(0, 0), CLEAR);
        assert_eq!(*frame.image().get_pixel(0, 5), CLEAR);
        assert_eq!(*frame.image().get_pixel(0, 6), BG);
        assert_eq!(*frame.image().get_pixel(0, 54), CLEAR);
        // Sprite at [14,18)x[18,22) → [28,36)x[42,50) after scale + pad
        assert_eq!(*frame.image().get_pixel(28, 42), HERO_COLORS[0]);
        assert_eq!(*frame.image().get_pixel(35, 49), HERO_COLORS[0]);
        assert_eq!(*frame.image().get_pixel(36, 49), BG);
    }

    #[test]
    fn test_z_order_later_on_top() {
        let mut scene = scene_with_hero();
        scene.cast_actor(villain(), Vec2::new(16.0, 20.0));
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .schedule(SceneActorEntry::idle("villain"));
        let (frame, _, _) = render_at(&scene, 0.0, None);
        assert_eq!(*frame.image().get_pixel(16, 20), crate::core::fixtures::VILLAIN_COLOR);
    }

    #[test]
    fn test_offscreen_actor_skipped() {
        let mut scene = scene_with_hero();
        scene.cast_actor(villain(), Vec2::new(60.0, 40.0));
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .schedule(SceneActorEntry::idle("villain"));
        let (_, poses, tl) = render_at(&scene, 0.0, None);

        let comp = Compositor::for_timeline(&tl, None, CLEAR);
        let visible: Vec<_> = comp
            .visible_actors(&poses, &tl)
            .into_iter()
            .map(|a| a.actor.to_string())
            .collect();
        assert_eq!(visible, vec!["hero".to_string()]);
        // Still tracked
        assert!(poses.actor(&"villain".into()).is_some());
    }

    /// Test: Culling a pose set with one actor outside the viewport
    /// Validates: Only the off-screen actor loses visibility, its position is kept
    #[test]
    fn test_cull_marks_offscreen_invisible() {
        let mut scene = scene_with_hero();
        scene.cast_actor(villain(), Vec2::new(60.0, 40.0));
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .schedule(SceneActorEntry::idle("villain"));
        let (frame, mut poses, tl) = render_at(&scene, 0.0, None);

        let comp = Compositor::for_timeline(&tl, None, CLEAR);
        assert_eq!(comp.cull(&mut poses, &tl), 1);
        assert!(poses.actor(&"hero".into()).unwrap().visible);
        let villain = poses.actor(&"villain".into()).unwrap();
        assert!(!villain.visible);
        assert_eq!(villain.position, Vec2::new(60.0, 40.0));

        // Culling never changes the picture
        assert_eq!(comp.render(&poses, &tl, 0), frame);
    }

    #[test]
    fn test_hidden_actor_not_drawn() {
        let mut scene = scene_with_hero();
        scene.schedule(SceneActorEntry::action("hero", "step", 0.0).hidden());
        let (frame, _, _) = render_at(&scene, 0.0, None);
        assert_eq!(*frame.image().get_pixel(15, 19), BG);
    }

    #[test]
    fn test_background_edge_uses_clear() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::idle("hero"))
            .move_camera(CameraMovement::pan(Vec2::new(-8.0, 0.0), 1.0));
        let (frame, _, _) = render_at(&scene, 1.0, None);
        assert_eq!(*frame.image().get_pixel(0, 0), CLEAR);
        assert_eq!(*frame.image().get_pixel(8, 0), BG);
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut scene = scene_with_hero();
        scene
            .schedule(SceneActorEntry::action("hero", "stroll", 0.0))
            .move_camera(CameraMovement::follow("hero", 3.0));
        let (a, _, _) = render_at(&scene, 1.7, Some((50, 37)));
        let (b, _, _) = render_at(&scene, 1.7, Some((50, 37)));
        assert_eq!(a, b);
    }
}
