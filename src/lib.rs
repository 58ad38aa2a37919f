//! CUTSCENE - 2D cutscene timeline, compositing and export library
//!
//! Re-exports all modules for use by binary targets.

// Core engine (timeline, clock, compositor, driver)
pub mod core;

// Data model and frame sinks
pub mod encode;
pub mod entities;

// Front end
pub mod cli;
pub mod manifest;

// Re-export commonly used types from core
pub use core::clock::{PoseSet, SceneClock};
pub use core::compositor::Compositor;
pub use core::driver::{CancelToken, FrameDriver, RenderConfig, RenderMode, RenderOutcome};
pub use core::timeline::{ResolvedTimeline, TimelineResolver};

// Re-export entities
pub use encode::FrameSink;
pub use entities::{ActorDefinition, Frame, SceneDefinition};
