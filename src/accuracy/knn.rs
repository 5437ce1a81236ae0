//! Built-in nearest-neighbour classifier
//!
//! Minimal k=1 classification so retrospective evaluation works without the
//! host's model runtime: the output of the closest training example (squared
//! Euclidean distance) is returned verbatim. Discrete class encodings plus
//! exact-match scoring make this sufficient for held-out accuracy.

use tracing::warn;

use crate::accuracy::Classifier;
use crate::iteration::Example;

#[derive(Debug, Default)]
pub struct NearestNeighborClassifier {
    examples: Vec<Example>,
    trained: bool,
}

impl NearestNeighborClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum()
    }
}

impl Classifier for NearestNeighborClassifier {
    fn clear_training_examples(&mut self) {
        self.examples.clear();
        self.trained = false;
    }

    fn add_training_example(&mut self, inputs: &[f32], outputs: &[f32]) {
        self.examples.push(Example::new(inputs.to_vec(), outputs.to_vec()));
    }

    fn train(&mut self) -> bool {
        // Lazy learner: training just validates that examples exist.
        self.trained = !self.examples.is_empty();
        self.trained
    }

    fn run(&mut self, inputs: &[f32], expected_output_len: usize) -> Vec<f32> {
        if !self.trained || self.examples.is_empty() {
            warn!("Nearest-neighbour model run before training, returning zeros");
            return vec![0.0; expected_output_len];
        }

        let nearest = self
            .examples
            .iter()
            .min_by(|a, b| {
                let da = Self::squared_distance(&a.inputs, inputs);
                let db = Self::squared_distance(&b.inputs, inputs);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|example| example.outputs.clone())
            .unwrap_or_default();

        let mut outputs = nearest;
        outputs.resize(expected_output_len, 0.0);
        outputs
    }
}
