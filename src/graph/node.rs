//! Feature-graph node model
//!
//! The host's visual-programming framework declares feature nodes; this crate
//! only needs enough structure to classify each node and walk its upstream
//! references. Node kinds form a closed enum with an explicit `Unrecognized`
//! variant so future node types degrade to a no-op instead of failing the
//! iteration.

use serde::{Deserialize, Serialize};

/// One node of the feature dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureNode {
    /// Display name of the node in the host graph
    pub name: String,
    pub kind: FeatureKind,
}

/// Node classification plus the kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FeatureKind {
    /// Positional leaf bound to one entity
    Position { entity: String },
    /// Euler-rotation leaf bound to one entity
    RotationEuler { entity: String },
    /// Quaternion-rotation leaf bound to one entity
    RotationQuaternion { entity: String },
    /// Distance from a first input to each of the second inputs; inputs may
    /// themselves be derived features
    DistanceToFirstInput {
        first_input: Box<FeatureNode>,
        second_inputs: Vec<FeatureNode>,
    },
    /// First derivative of a single upstream feature
    Velocity { input: Box<FeatureNode> },
    /// Second derivative, usually a velocity chained onto another velocity
    Acceleration { input: Box<FeatureNode> },
    /// Sliding-window aggregator over several upstream features
    Window { inputs: Vec<FeatureNode> },
    /// Node type this crate does not know; resolves to nothing
    Unrecognized,
}

impl FeatureNode {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self { name: name.into(), kind }
    }

    /// Convenience constructor for a positional leaf
    pub fn position(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, FeatureKind::Position { entity: entity.into() })
    }

    /// Convenience constructor for a velocity node over `input`
    pub fn velocity(name: impl Into<String>, input: FeatureNode) -> Self {
        Self::new(name, FeatureKind::Velocity { input: Box::new(input) })
    }

    /// Convenience constructor for an acceleration node over `input`
    pub fn acceleration(name: impl Into<String>, input: FeatureNode) -> Self {
        Self::new(name, FeatureKind::Acceleration { input: Box::new(input) })
    }
}
