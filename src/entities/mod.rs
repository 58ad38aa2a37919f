//! Entities module - scene data model, shared by the engine and the front ends
//!
//! Everything here is plain data: authored definitions (actors, scenes,
//! schedules), the speed table, rendered frames and the error taxonomy.

pub mod actor;
pub mod error;
pub mod frame;
pub mod scene;
pub mod speed;

pub use actor::{
    ActionComponent, ActionDefinition, ActorDefinition, ActorId, Direction, ImageHandle, Motion, SpriteSheet,
};
pub use error::{MotionError, ResolveError, SchemaError, SinkError};
pub use frame::Frame;
pub use scene::{
    CameraMovement, CameraMovementKind, CameraSpec, CastMember, Rect, SceneActorEntry, SceneDefinition, Schedule,
};
pub use speed::{SpeedTable, SpeedTier};
