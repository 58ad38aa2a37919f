//! Scene manifest - JSON description of a scene plus the image files it uses.
//!
//! ```json
//! {
//!   "name": "intro",
//!   "background": "bg.png",
//!   "camera": { "viewport": { "origin": [0, 0], "size": [320, 240] } },
//!   "camera_moves": [ { "type": "follow_actor", "actor": "hero", "duration": 3.0 } ],
//!   "actors": [ {
//!     "id": "hero", "origin": [40, 120], "sprites": ["hero_0.png", "hero_1.png"],
//!     "actions": [ { "name": "walk", "components": [
//!       { "sprite": 1, "motion": { "type": "speed_based", "tier": "normal", "offset": [96, 0] } }
//!     ] } ]
//!   } ],
//!   "entries": [ { "actor": "hero", "start": 0.5, "schedule": { "type": "action", "action": "walk" } } ],
//!   "render": { "fps": 30 }
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use anyhow::{Context, Result, bail};
use glam::Vec2;
use image::RgbaImage;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::driver::RenderConfig;
use crate::entities::actor::{ActionComponent, ActionDefinition, ActorDefinition, ActorId, SpriteSheet};
use crate::entities::scene::{CameraMovement, CameraSpec, SceneActorEntry, SceneDefinition};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionManifest {
    pub name: String,
    pub components: Vec<ActionComponent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorManifest {
    pub id: ActorId,
    /// Starting position in background pixels.
    pub origin: Vec2,
    /// One image file per sprite frame.
    pub sprites: Vec<PathBuf>,
    #[serde(default)]
    pub idle_frame: usize,
    #[serde(default)]
    pub actions: Vec<ActionManifest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    pub name: String,
    pub background: PathBuf,
    pub camera: CameraSpec,
    #[serde(default)]
    pub camera_moves: Vec<CameraMovement>,
    #[serde(default)]
    pub actors: Vec<ActorManifest>,
    #[serde(default)]
    pub entries: Vec<SceneActorEntry>,
    /// Render settings stored with the scene; CLI flags override them.
    #[serde(default)]
    pub render: Option<RenderConfig>,
}

impl SceneManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid scene manifest")
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid scene manifest: {}", path.display()))
    }

    /// Decode every image and build the scene. Paths are relative to `base_dir`.
    pub fn into_scene(self, base_dir: &Path) -> Result<SceneDefinition> {
        let mut images = ImageCache::new(base_dir);

        let background = images.load(&self.background)?;
        let mut scene = SceneDefinition::new(self.name, background, self.camera);

        for actor in self.actors {
            if actor.sprites.is_empty() {
                bail!("Actor '{}' has no sprites", actor.id);
            }
            let frames = actor
                .sprites
                .iter()
                .map(|p| images.load(p).map(|img| (*img).clone()))
                .collect::<Result<Vec<RgbaImage>>>()?;

            let mut definition = ActorDefinition::new(actor.id, SpriteSheet::new(frames));
            definition.idle_frame = actor.idle_frame;
            for action in actor.actions {
                definition = definition.with_action(ActionDefinition::new(action.name, action.components));
            }
            trace!("Actor '{}': {} sprites", definition.id, definition.sprite_sheet.len());
            scene.cast_actor(definition, actor.origin);
        }

        for movement in self.camera_moves {
            scene.move_camera(movement);
        }
        for entry in self.entries {
            scene.schedule(entry);
        }

        debug!(
            "Scene '{}' loaded: {} cast, {} entries, {} images",
            scene.name,
            scene.cast.len(),
            scene.entries.len(),
            images.len()
        );
        Ok(scene)
    }
}

/// Load a manifest file into a scene plus its stored render settings.
pub fn load_scene(path: &Path) -> Result<(SceneDefinition, Option<RenderConfig>)> {
    let manifest = SceneManifest::load(path)?;
    let render = manifest.render.clone();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let scene = manifest
        .into_scene(base_dir)
        .with_context(|| format!("Failed to build scene from {}", path.display()))?;
    Ok((scene, render))
}

/// Decodes each file once.
struct ImageCache<'a> {
    base_dir: &'a Path,
    loaded: HashMap<PathBuf, Arc<RgbaImage>>,
}

impl<'a> ImageCache<'a> {
    fn new(base_dir: &'a Path) -> Self {
        Self {
            base_dir,
            loaded: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.loaded.len()
    }

    fn load(&mut self, path: &Path) -> Result<Arc<RgbaImage>> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        if let Some(img) = self.loaded.get(&full) {
            return Ok(Arc::clone(img));
        }
        let img = image::open(&full)
            .with_context(|| format!("Failed to load image: {}", full.display()))?
            .to_rgba8();
        trace!("Loaded {} ({}x{})", full.display(), img.width(), img.height());
        let img = Arc::new(img);
        self.loaded.insert(full, Arc::clone(&img));
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::driver::RenderMode;
    use crate::core::timeline::TimelineResolver;
    use approx::assert_relative_eq;
    use image::Rgba;

    const MANIFEST: &str = r#"{
        "name": "intro",
        "background": "bg.png",
        "camera": { "viewport": { "origin": [0, 0], "size": [32, 24] } },
        "camera_moves": [
            { "type": "follow_actor", "actor": "hero", "duration": 1.0 },
            { "type": "manual_offset", "offset": [4, 0], "duration": 0.5, "start": 2.0 }
        ],
        "actors": [ {
            "id": "hero",
            "origin": [16, 12],
            "sprites": ["hero_0.png", "hero_1.png"],
            "actions": [ { "name": "walk", "components": [
                { "sprite": 1, "motion": { "type": "speed_based", "tier": "normal", "offset": [90, 0] } },
                { "sprite": 0, "motion": { "type": "manual", "duration": 0.25, "offset": [0, 0] } }
            ] } ]
        } ],
        "entries": [
            { "actor": "hero", "start": 0.5, "schedule": { "type": "action", "action": "walk", "repeat": 2 } }
        ],
        "render": { "fps": 12, "mode": "preview" }
    }"#;

    fn write_images(dir: &Path) {
        RgbaImage::from_pixel(64, 48, Rgba([0, 0, 80, 255]))
            .save(dir.join("bg.png"))
            .unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
            .save(dir.join("hero_0.png"))
            .unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]))
            .save(dir.join("hero_1.png"))
            .unwrap();
    }

    /// Test: Manifest with relative image paths
    /// Validates: Scene builds, resolves, and keeps the stored render settings
    #[test]
    fn test_load_scene() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let path = dir.path().join("scene.json");
        std::fs::write(&path, MANIFEST).unwrap();

        let (scene, render) = load_scene(&path).unwrap();
        assert_eq!(scene.name, "intro");
        assert_eq!(scene.background.dimensions(), (64, 48));
        assert_eq!(scene.cast.len(), 1);
        assert_eq!(scene.cast[0].origin, Vec2::new(16.0, 12.0));
        assert_eq!(scene.cast[0].actor.sprite_sheet.len(), 2);

        let render = render.unwrap();
        assert_eq!(render.fps, 12);
        assert_eq!(render.mode, RenderMode::Preview);
        // Unset realtime follows the stored mode
        assert!(render.realtime);

        // walk = 90px at 180px/s + 0.25s pause, twice, starting at 0.5
        let timeline = TimelineResolver::new().resolve(&scene).unwrap();
        assert_relative_eq!(timeline.total_duration, 2.5);
    }

    #[test]
    fn test_missing_image_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = SceneManifest::from_json(MANIFEST).unwrap();
        let err = manifest.into_scene(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("bg.png"));
    }

    #[test]
    fn test_bad_json_names_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_scene(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_actor_without_sprites() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let mut manifest = SceneManifest::from_json(MANIFEST).unwrap();
        manifest.actors[0].sprites.clear();
        assert!(manifest.into_scene(dir.path()).is_err());
    }
}
