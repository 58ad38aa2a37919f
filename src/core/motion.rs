//! MotionModel - maps (component, elapsed time) to a positional offset.
//!
//! Both motion systems converge here: speed-based components derive their
//! duration from the speed table, then everything goes through the same linear
//! interpolation. There is no easing.

use glam::Vec2;

use crate::entities::actor::{ActionComponent, Motion};
use crate::entities::error::MotionError;
use crate::entities::speed::SpeedTable;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionModel {
    table: SpeedTable,
}

impl MotionModel {
    pub fn new(table: SpeedTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SpeedTable {
        &self.table
    }

    /// Duration of a component in seconds. Always > 0 on success.
    pub fn duration_of(&self, component: &ActionComponent) -> Result<f64, MotionError> {
        let duration = match component.motion {
            Motion::Manual { duration, .. } => duration,
            Motion::SpeedBased { tier, offset } => {
                let speed = self.table.pixels_per_second(tier);
                let distance = offset.length() as f64;
                if distance != 0.0 && speed <= 0.0 {
                    return Err(MotionError::InvalidComponent(format!(
                        "speed tier '{}' resolves to {} px/s for a {} px move",
                        tier, speed, distance
                    )));
                }
                distance / speed
            }
        };

        if !duration.is_finite() || duration <= 0.0 {
            return Err(MotionError::InvalidComponent(format!(
                "duration must be positive, got {}",
                duration
            )));
        }
        Ok(duration)
    }

    /// Offset from the component's start position after `elapsed` seconds.
    pub fn position_at(&self, component: &ActionComponent, elapsed: f64) -> Result<Vec2, MotionError> {
        let duration = self.duration_of(component)?;
        Ok(interpolate(component.motion.offset(), duration, elapsed))
    }
}

impl Default for MotionModel {
    fn default() -> Self {
        Self::new(SpeedTable::V1)
    }
}

/// Linear interpolation from zero to `offset` over `duration`, clamped at both ends.
pub fn interpolate(offset: Vec2, duration: f64, elapsed: f64) -> Vec2 {
    if duration <= 0.0 {
        return offset;
    }
    let u = (elapsed / duration).clamp(0.0, 1.0);
    if u >= 1.0 {
        return offset;
    }
    offset * u as f32
}
