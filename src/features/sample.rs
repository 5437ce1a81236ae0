//! Flat feature samples captured from tracked entities
//!
//! A sample is one named numeric vector (position, rotation, or a derived
//! quantity) for one entity at one capture tick. Samples are immutable once
//! produced and live only as long as the extraction pass that created them,
//! unless snapshotted into an iteration record.

use serde::{Deserialize, Serialize};

/// Position and rotation provider for one tracked entity.
///
/// The host scene model implements this; the telemetry layer never owns
/// entities, it only reads them at capture time.
pub trait EntityState {
    /// Stable display name of the entity
    fn name(&self) -> &str;
    /// World position as `[x, y, z]`
    fn position(&self) -> [f32; 3];
    /// Rotation as Euler angles `[x, y, z]` in degrees
    fn rotation_euler(&self) -> [f32; 3];
    /// Rotation as a quaternion `[x, y, z, w]`
    fn rotation_quaternion(&self) -> [f32; 4];
}

/// One extracted quantity for one entity at one moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSample {
    /// What was extracted, e.g. "Position" or "Velocity (Rotation Euler)"
    pub feature_name: String,
    /// Which entity the values were read from
    pub entity: String,
    /// Component values; length depends on the feature kind (3 or 4)
    pub values: Vec<f32>,
    /// Target/testing label recorded alongside the capture, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<f32>,
}

impl FeatureSample {
    pub fn as_position(entity: &dyn EntityState, label: &[f32]) -> Self {
        Self {
            feature_name: "Position".to_string(),
            entity: entity.name().to_string(),
            values: entity.position().to_vec(),
            label: label.to_vec(),
        }
    }

    pub fn as_rotation_euler(entity: &dyn EntityState, label: &[f32]) -> Self {
        Self {
            feature_name: "Rotation (Euler)".to_string(),
            entity: entity.name().to_string(),
            values: entity.rotation_euler().to_vec(),
            label: label.to_vec(),
        }
    }

    pub fn as_rotation_quaternion(entity: &dyn EntityState, label: &[f32]) -> Self {
        Self {
            feature_name: "Rotation (Quaternion)".to_string(),
            entity: entity.name().to_string(),
            values: entity.rotation_quaternion().to_vec(),
            label: label.to_vec(),
        }
    }

    /// Wraps an already-computed derivative as a velocity sample
    pub fn as_velocity(entity_name: &str, source: DerivativeSource, values: Vec<f32>, label: &[f32]) -> Self {
        Self {
            feature_name: format!("Velocity ({})", source.label()),
            entity: entity_name.to_string(),
            values,
            label: label.to_vec(),
        }
    }

    /// Wraps an already-computed second derivative as an acceleration sample
    pub fn as_acceleration(entity_name: &str, source: DerivativeSource, values: Vec<f32>, label: &[f32]) -> Self {
        Self {
            feature_name: format!("Acceleration ({})", source.label()),
            entity: entity_name.to_string(),
            values,
            label: label.to_vec(),
        }
    }
}

/// Which raw signal a derivative sample was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeSource {
    Position,
    RotationEuler,
    RotationQuaternion,
}

impl DerivativeSource {
    fn label(self) -> &'static str {
        match self {
            DerivativeSource::Position => "Position",
            DerivativeSource::RotationEuler => "Rotation Euler",
            DerivativeSource::RotationQuaternion => "Rotation Quaternion",
        }
    }

    /// Component count of the underlying signal
    pub fn dimension(self) -> usize {
        match self {
            DerivativeSource::Position | DerivativeSource::RotationEuler => 3,
            DerivativeSource::RotationQuaternion => 4,
        }
    }
}
