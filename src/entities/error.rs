//! Error taxonomy for scene resolution, motion derivation and frame delivery.
//!
//! Resolution errors (`SchemaError`, `MotionError`) are raised eagerly by the
//! timeline resolver, before the first frame is computed. `SinkError` is raised
//! while frames are being delivered and aborts the run. Cancellation is not an
//! error; see [`crate::core::driver::RenderOutcome`].

use std::fmt;

/// Malformed scene definition.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Two scheduled intervals of the same owner (an actor or the camera) overlap.
    OverlappingSchedule {
        owner: String,
        first: (f64, f64),
        second: (f64, f64),
    },
    /// A scheduled action has no components.
    EmptyAction { actor: String, action: String },
    /// An entry points at an actor, action or sprite frame that does not exist.
    UnresolvedReference(String),
    /// The same actor id appears twice in the cast.
    DuplicateActor(String),
    /// Two actions of one actor share a name.
    DuplicateAction { actor: String, action: String },
    /// An action is scheduled to run zero times.
    InvalidRepeat { actor: String, action: String },
    /// A start time or duration is negative, zero where it must be positive, or not finite.
    InvalidTime { owner: String, value: f64 },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::OverlappingSchedule { owner, first, second } => write!(
                f,
                "Overlapping schedule for {}: [{:.3}, {:.3}) and [{:.3}, {:.3})",
                owner, first.0, first.1, second.0, second.1
            ),
            SchemaError::EmptyAction { actor, action } => {
                write!(f, "Action '{}' of actor '{}' has no components", action, actor)
            }
            SchemaError::UnresolvedReference(what) => write!(f, "Unresolved reference: {}", what),
            SchemaError::DuplicateActor(id) => write!(f, "Actor '{}' is cast more than once", id),
            SchemaError::DuplicateAction { actor, action } => {
                write!(f, "Actor '{}' defines action '{}' more than once", actor, action)
            }
            SchemaError::InvalidRepeat { actor, action } => {
                write!(f, "Action '{}' of actor '{}' is scheduled zero times", action, actor)
            }
            SchemaError::InvalidTime { owner, value } => {
                write!(f, "Invalid time value {} for {}", value, owner)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Degenerate motion definition.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    InvalidComponent(String),
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::InvalidComponent(msg) => write!(f, "Invalid action component: {}", msg),
        }
    }
}

impl std::error::Error for MotionError {}

/// Any failure of `TimelineResolver::resolve`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    Schema(SchemaError),
    Motion(MotionError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Schema(e) => write!(f, "Schema error: {}", e),
            ResolveError::Motion(e) => write!(f, "Motion error: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Schema(e) => Some(e),
            ResolveError::Motion(e) => Some(e),
        }
    }
}

impl From<SchemaError> for ResolveError {
    fn from(e: SchemaError) -> Self {
        ResolveError::Schema(e)
    }
}

impl From<MotionError> for ResolveError {
    fn from(e: MotionError) -> Self {
        ResolveError::Motion(e)
    }
}

/// Preview surface or encoder failure.
#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Image(String),
    Encode(String),
    /// Frame pushed before `begin` or after the sink was finalized/aborted.
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "Sink I/O error: {}", e),
            SinkError::Image(e) => write!(f, "Image write error: {}", e),
            SinkError::Encode(e) => write!(f, "Encoding failed: {}", e),
            SinkError::Closed => write!(f, "Sink is not accepting frames"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_owner() {
        let e = SchemaError::OverlappingSchedule {
            owner: "actor 'hero'".into(),
            first: (0.0, 2.0),
            second: (1.0, 3.0),
        };
        let s = e.to_string();
        assert!(s.contains("hero"));
        assert!(s.contains("[1.000, 3.000)"));
    }

    #[test]
    fn test_resolve_error_source() {
        use std::error::Error;
        let e: ResolveError = MotionError::InvalidComponent("zero speed".into()).into();
        assert!(e.source().is_some());
        assert!(e.to_string().starts_with("Motion error"));
    }
}
