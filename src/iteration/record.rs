//! One bounded window of model-steering activity
//!
//! A record captures everything about one steering iteration for a
//! (graph, model) pair: timestamps, the frozen training and testing sets, the
//! live feature wiring, and the all-possible-feature snapshots collected
//! while the iteration was open. Records are owned exclusively by one
//! [`IterationStore`](crate::iteration::IterationStore) and become immutable
//! once closed, other than being read for accuracy evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::features::{capture_entity_features, ExtractorCache, FeatureSample};
use crate::graph::{collect_entity_descriptors, collect_feature_names};
use crate::iteration::ModelSnapshot;

/// One labelled input/output pair, used for both training and testing sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub inputs: Vec<f32>,
    pub outputs: Vec<f32>,
}

impl Example {
    pub fn new(inputs: Vec<f32>, outputs: Vec<f32>) -> Self {
        Self { inputs, outputs }
    }
}

/// Telemetry for one steering iteration of one model
#[derive(Debug, Serialize, Deserialize)]
pub struct IterationRecord {
    pub graph_id: String,
    pub model_id: String,
    pub scene_name: String,

    pub start_time: DateTime<Utc>,
    /// Stamped exactly once, when the iteration closes
    pub end_time: Option<DateTime<Utc>>,
    /// Zero while the iteration is open; > 0 marks it closed
    pub total_seconds: f64,

    /// Training set frozen at iteration end
    #[serde(default)]
    pub training_examples: Vec<Example>,
    /// Testing set frozen at iteration end, one group per class
    #[serde(default)]
    pub testing_examples_by_class: Vec<Vec<Example>>,

    /// Display names of the features wired into the model when it closed
    #[serde(default)]
    pub features_in_use: Vec<String>,
    /// Display descriptors of the entities backing those features
    #[serde(default)]
    pub entities_in_use: Vec<String>,

    /// Per-tick snapshots of every supported feature, training stream
    #[serde(default)]
    pub all_possible_training_features: Vec<FeatureSample>,
    /// Per-tick snapshots of every supported feature, testing stream
    #[serde(default)]
    pub all_possible_testing_features: Vec<FeatureSample>,

    // The two streams are sampled independently, so each role keeps its own
    // extractor state. Never persisted; rebuilt empty on load.
    #[serde(skip)]
    pub(crate) training_extractors: ExtractorCache,
    #[serde(skip)]
    pub(crate) testing_extractors: ExtractorCache,
}

impl IterationRecord {
    /// Opens a new iteration stamped now (UTC)
    pub fn start(graph_id: &str, model_id: &str, scene_name: &str) -> Self {
        debug!("Starting iteration for graph {graph_id}, model {model_id}");
        Self {
            graph_id: graph_id.to_string(),
            model_id: model_id.to_string(),
            scene_name: scene_name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            total_seconds: 0.0,
            training_examples: Vec::new(),
            testing_examples_by_class: Vec::new(),
            features_in_use: Vec::new(),
            entities_in_use: Vec::new(),
            all_possible_training_features: Vec::new(),
            all_possible_testing_features: Vec::new(),
            training_extractors: ExtractorCache::new(),
            testing_extractors: ExtractorCache::new(),
        }
    }

    /// `total_seconds == 0` means the iteration is still open
    pub fn is_finished(&self) -> bool {
        self.total_seconds > 0.0
    }

    /// Whether anything has been captured into this record yet
    pub fn has_data(&self) -> bool {
        !self.training_examples.is_empty()
            || !self.testing_examples_by_class.is_empty()
            || !self.all_possible_training_features.is_empty()
            || !self.all_possible_testing_features.is_empty()
            || !self.features_in_use.is_empty()
    }

    /// Hours elapsed since the iteration was opened
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Closes the iteration. A mismatched key is a logged error with no state
    /// change; iteration tracking must never take down the live session.
    pub fn end(&mut self, graph_id: &str, model_id: &str) -> bool {
        if self.graph_id != graph_id || self.model_id != model_id {
            error!(
                "Wrong iteration selected to end: graph passed {graph_id} vs {}, \
                 model passed {model_id} vs {}",
                self.graph_id, self.model_id
            );
            return false;
        }
        let end_time = Utc::now();
        self.total_seconds = (end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
        // Closing must always mark the record finished, even within the same
        // millisecond as the start stamp.
        if self.total_seconds <= 0.0 {
            self.total_seconds = f64::EPSILON;
        }
        self.end_time = Some(end_time);
        debug!("Iteration finished by model node {model_id}");
        true
    }

    /// Freezes the live feature wiring connected to the model node
    pub fn save_live_features(&mut self, model: &dyn ModelSnapshot) {
        let features = model.input_features();
        self.features_in_use = collect_feature_names(&features);
        self.entities_in_use = collect_entity_descriptors(&features);
    }

    /// Freezes the model's training set into the record
    pub fn save_training_data(&mut self, model: &dyn ModelSnapshot) {
        for example in model.training_examples() {
            if example.inputs.is_empty() || example.outputs.is_empty() {
                error!("Null inputs/outputs found in training set, example skipped");
                continue;
            }
            self.training_examples.push(example);
        }
    }

    /// Freezes the model's testing set, grouped by class
    pub fn save_testing_data(&mut self, model: &dyn ModelSnapshot) {
        self.testing_examples_by_class = model.testing_examples_by_class();
    }

    /// Captures the full feature catalogue for `entity` on the training
    /// stream; extractor state persists across ticks within this record.
    pub fn capture_training_features(
        &mut self,
        entity: &dyn crate::features::EntityState,
        delta_time: f32,
        label: &[f32],
    ) {
        let extractors = self.training_extractors.get_or_create(entity.name());
        let samples = capture_entity_features(entity, extractors, delta_time, label);
        self.all_possible_training_features.extend(samples);
    }

    /// Testing-stream counterpart of [`capture_training_features`]
    ///
    /// [`capture_training_features`]: IterationRecord::capture_training_features
    pub fn capture_testing_features(
        &mut self,
        entity: &dyn crate::features::EntityState,
        delta_time: f32,
        label: &[f32],
    ) {
        let extractors = self.testing_extractors.get_or_create(entity.name());
        let samples = capture_entity_features(entity, extractors, delta_time, label);
        self.all_possible_testing_features.extend(samples);
    }
}
