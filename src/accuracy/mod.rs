//! Retrospective accuracy evaluation
//!
//! Consumes saved iteration stores, re-trains a classifier per iteration on
//! the frozen training set, and scores the held-out testing set with
//! exact-match semantics. Results append into a per-model accuracy history.

pub mod evaluator;
pub mod history;
pub mod knn;

pub use evaluator::{evaluate_store, FileAccuracy, IterationResult};
pub use history::{IterationAccuracy, ModelAccuracyHistory, ParticipantAccuracy};
pub use knn::NearestNeighborClassifier;

/// Trainable classifier capability.
///
/// Training is never incremental across iterations; the evaluator clears and
/// re-trains for every record it processes.
pub trait Classifier {
    /// Drops every training example held by the model
    fn clear_training_examples(&mut self);
    /// Adds one labelled example to the pending training set
    fn add_training_example(&mut self, inputs: &[f32], outputs: &[f32]);
    /// Trains on the pending set; returns false when training is impossible
    /// (e.g. no examples)
    fn train(&mut self) -> bool;
    /// Runs the trained model; the output vector has `expected_output_len`
    /// components
    fn run(&mut self, inputs: &[f32], expected_output_len: usize) -> Vec<f32>;
}
