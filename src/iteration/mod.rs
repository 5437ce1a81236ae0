//! Iteration lifecycle tracking
//!
//! The store owns the ordered list of iteration records for one
//! (project, scene) pairing and the reconciliation policy for concurrent,
//! stale, and orphaned iterations. The host exposes its model and
//! training-examples nodes through the capability traits below; the
//! telemetry layer never holds references into the host graph.

pub mod record;
pub mod store;

pub use record::{Example, IterationRecord};
pub use store::{IterationPolicy, IterationStore};

use crate::features::EntityState;
use crate::graph::FeatureNode;

/// Opaque view of a trained-model node at iteration end.
///
/// Training and testing payloads are pulled once and frozen into the record;
/// the model itself stays a black box.
pub trait ModelSnapshot {
    /// Identifier of the model node in the host graph
    fn model_id(&self) -> &str;
    /// Feature nodes currently wired into the model
    fn input_features(&self) -> Vec<FeatureNode>;
    /// The collected training set
    fn training_examples(&self) -> Vec<Example>;
    /// The collected testing set, one group per class
    fn testing_examples_by_class(&self) -> Vec<Vec<Example>>;
    /// Label the model is currently being tested against, if any
    fn current_testing_label(&self) -> Vec<f32> {
        Vec::new()
    }
    /// Live state lookup for an entity named by the feature graph
    fn entity(&self, name: &str) -> Option<&dyn EntityState>;
}

/// View of a training-examples node while examples are being recorded.
///
/// Iterations may start before any model node is connected; the node's own id
/// then stands in as the model key until a downstream model claims it.
pub trait TrainingSource {
    /// Identifier of the graph this node belongs to
    fn graph_id(&self) -> &str;
    /// Identifier of the training-examples node itself
    fn node_id(&self) -> &str;
    /// Feature nodes currently wired into this node
    fn input_features(&self) -> Vec<FeatureNode>;
    /// Target values of the example being recorded
    fn target_values(&self) -> Vec<f32>;
    /// Ids of model nodes connected downstream of this node
    fn connected_model_ids(&self) -> Vec<String>;
    /// Live state lookup for an entity named by the feature graph
    fn entity(&self, name: &str) -> Option<&dyn EntityState>;
}
