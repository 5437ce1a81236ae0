//! Iteration store and lifecycle state machine
//!
//! States per (graph, model) key: Absent -> Open -> Closed. Closing an
//! iteration immediately opens a fresh one for the same key so continuous
//! steering is never blocked. The "current iteration" is an index into the
//! owned list, never a second owner, so a record with data is in the list by
//! construction.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::graph::resolve_entities;
use crate::iteration::{IterationRecord, ModelSnapshot, TrainingSource};

/// Reconciliation policy knobs; product decisions, not algorithmic ones
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IterationPolicy {
    /// An open iteration older than this is obsolete and never reused
    pub staleness_hours: f64,
    /// Closed iterations beyond this count trigger a file rollover
    pub rollover_threshold: usize,
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self {
            staleness_hours: 4.0,
            rollover_threshold: 10,
        }
    }
}

/// Ordered collection of iteration records for one (project, scene) pairing
#[derive(Debug, Serialize, Deserialize)]
pub struct IterationStore {
    pub project_id: String,
    pub scene_name: String,
    /// Count of iterations closed over the lifetime of this store
    pub num_iterations: u32,
    /// Index of the iteration currently being steered, if any
    current: Option<usize>,
    pub iterations: Vec<IterationRecord>,
    #[serde(skip, default)]
    policy: IterationPolicy,
}

impl IterationStore {
    pub fn new(project_id: &str, scene_name: &str, policy: IterationPolicy) -> Self {
        Self {
            project_id: project_id.to_string(),
            scene_name: scene_name.to_string(),
            num_iterations: 0,
            current: None,
            iterations: Vec::new(),
            policy,
        }
    }

    /// Restores the policy after deserialization (the policy itself lives in
    /// configuration, not in the data file)
    pub fn set_policy(&mut self, policy: IterationPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> IterationPolicy {
        self.policy
    }

    pub fn record(&self, index: usize) -> Option<&IterationRecord> {
        self.iterations.get(index)
    }

    pub fn record_mut(&mut self, index: usize) -> Option<&mut IterationRecord> {
        self.iterations.get_mut(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_record(&self) -> Option<&IterationRecord> {
        self.current.and_then(|index| self.iterations.get(index))
    }

    /// How many records in the list are already closed
    pub fn finished_count(&self) -> usize {
        self.iterations.iter().filter(|record| record.is_finished()).count()
    }

    /// Returns the open iteration for the key, starting one if needed.
    ///
    /// Idempotent: called twice without an intervening end, both calls land
    /// on the same record. An open record older than the staleness window is
    /// considered obsolete and left behind.
    pub fn get_or_start_iteration(&mut self, graph_id: &str, model_id: &str) -> usize {
        let now = Utc::now();

        // Fast path: the current pointer already holds the open iteration.
        if let Some(index) = self.current {
            if let Some(record) = self.iterations.get(index) {
                if record.graph_id == graph_id
                    && record.model_id == model_id
                    && !record.is_finished()
                    && record.age_hours(now) < self.policy.staleness_hours
                {
                    return index;
                }
            }
        }

        // Any other open iteration for this exact key, oldest first.
        if let Some(index) = self.get_iteration(graph_id, Some(model_id), true, true) {
            let record = &self.iterations[index];
            if record.age_hours(now) < self.policy.staleness_hours {
                self.current = Some(index);
                return index;
            }
            debug!(
                "Open iteration for graph {graph_id}, model {model_id} is older than \
                 {:.1}h, starting a fresh one",
                self.policy.staleness_hours
            );
        }

        // New model steering iteration. Appending before returning keeps the
        // no-silent-loss invariant mechanical: every record is in the list
        // from the moment it exists.
        self.iterations
            .push(IterationRecord::start(graph_id, model_id, &self.scene_name));
        let index = self.iterations.len() - 1;
        self.current = Some(index);
        index
    }

    /// Searches the list the way the steering workflow needs it: by graph,
    /// optionally by model, filtered to open or closed records, returning the
    /// oldest or the first match.
    pub fn get_iteration(
        &self,
        graph_id: &str,
        model_id: Option<&str>,
        search_unfinished: bool,
        search_oldest_match: bool,
    ) -> Option<usize> {
        let mut found: Option<usize> = None;
        for (index, record) in self.iterations.iter().enumerate() {
            if record.graph_id != graph_id {
                continue;
            }
            if let Some(model_id) = model_id {
                if record.model_id != model_id {
                    continue;
                }
            }
            if record.is_finished() == search_unfinished {
                continue;
            }
            if !search_oldest_match {
                return Some(index);
            }
            match found {
                Some(best) if self.iterations[best].start_time <= record.start_time => {}
                _ => found = Some(index),
            }
        }
        found
    }

    /// Closes the open iteration for the key, freezing the model's datasets
    /// into it, and immediately opens a fresh iteration for the same key.
    ///
    /// A key with no open iteration is a logged error and leaves all state
    /// unchanged; the live session must never be destabilized from here.
    pub fn end_iteration(
        &mut self,
        graph_id: &str,
        model_id: &str,
        model: Option<&dyn ModelSnapshot>,
    ) -> bool {
        let index = self
            .current
            .filter(|&index| {
                self.iterations
                    .get(index)
                    .map(|record| {
                        record.graph_id == graph_id
                            && record.model_id == model_id
                            && !record.is_finished()
                    })
                    .unwrap_or(false)
            })
            .or_else(|| self.get_iteration(graph_id, Some(model_id), true, true));

        let Some(index) = index else {
            error!(
                "Trying to end an iteration that doesn't exist or is invalid. \
                 Graph: {graph_id}, Model: {model_id}"
            );
            return false;
        };

        let record = &mut self.iterations[index];
        if let Some(model) = model {
            record.save_live_features(model);
            record.save_training_data(model);
            record.save_testing_data(model);
        }
        if !record.end(graph_id, model_id) {
            return false;
        }
        self.num_iterations += 1;
        info!(
            "Iteration {} closed for graph {graph_id}, model {model_id} after {:.2}s",
            self.num_iterations, self.iterations[index].total_seconds
        );

        // Continuous steering: a fresh iteration opens for the same key
        // before the caller sees the closed one.
        self.get_or_start_iteration(graph_id, model_id);
        true
    }

    /// Captures the all-possible-feature snapshot on the training stream.
    ///
    /// Called every time a training example is collected. Also the claim
    /// point for orphaned iterations: a record opened under the training
    /// node's own id is re-keyed once exactly one downstream model is found.
    pub fn save_all_possible_training_features(
        &mut self,
        source: &dyn TrainingSource,
        delta_time: f32,
    ) {
        let graph_id = source.graph_id().to_string();

        if self.current_record().is_none() {
            self.get_or_start_iteration(&graph_id, source.node_id());
        }

        // Unclaimed iteration: no model key yet, or keyed by the training
        // node itself because no model node was connected when it opened.
        let current_model = self
            .current_record()
            .map(|record| record.model_id.clone())
            .unwrap_or_default();
        if current_model.is_empty() || current_model == source.node_id() {
            let model_ids = source.connected_model_ids();
            let resolved = if model_ids.len() == 1 {
                // Exactly one model downstream: it claims the iteration
                // instead of a duplicate being opened later.
                let claimed = model_ids[0].clone();
                if let Some(index) = self.current {
                    if let Some(record) = self.iterations.get_mut(index) {
                        if record.model_id != claimed {
                            debug!(
                                "Orphaned iteration claimed by model {claimed} \
                                 (was {})",
                                record.model_id
                            );
                            record.model_id = claimed.clone();
                        }
                    }
                }
                claimed
            } else {
                // Still no single model: keep the training node's id as the
                // key so the data is not lost.
                source.node_id().to_string()
            };
            self.get_or_start_iteration(&graph_id, &resolved);
        }

        let Some(index) = self.current else { return };
        let entities = resolve_entities(&source.input_features());
        let label = source.target_values();
        let record = &mut self.iterations[index];
        for name in &entities {
            if let Some(state) = source.entity(name) {
                record.capture_training_features(state, delta_time, &label);
            }
        }
    }

    /// Captures the all-possible-feature snapshot on the testing stream,
    /// called every time a testing example is collected.
    pub fn save_all_possible_testing_features(
        &mut self,
        graph_id: &str,
        model: &dyn ModelSnapshot,
        delta_time: f32,
    ) {
        let needs_iteration = self
            .current_record()
            .map(|record| !record.has_data() && record.model_id != model.model_id())
            .unwrap_or(true);
        if needs_iteration {
            self.get_or_start_iteration(graph_id, model.model_id());
        }

        let Some(index) = self.current else { return };
        let entities = resolve_entities(&model.input_features());
        let label = model.current_testing_label();
        let record = &mut self.iterations[index];
        for name in &entities {
            if let Some(state) = model.entity(name) {
                record.capture_testing_features(state, delta_time, &label);
            }
        }
    }

    /// Whether the store has accumulated enough closed iterations for the
    /// active file to be archived
    pub fn needs_rollover(&self) -> bool {
        self.finished_count() > self.policy.rollover_threshold
    }

    /// Drops every closed record, keeping only still-open iterations; the
    /// current pointer is re-derived. The persistence layer archives the file
    /// before calling this.
    pub fn retain_open_iterations(&mut self) {
        let current_key = self
            .current_record()
            .map(|record| (record.graph_id.clone(), record.model_id.clone(), record.start_time));
        self.iterations.retain(|record| !record.is_finished());
        self.current = current_key.and_then(|(graph_id, model_id, start_time)| {
            self.iterations.iter().position(|record| {
                record.graph_id == graph_id
                    && record.model_id == model_id
                    && record.start_time == start_time
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::EntityState;
    use crate::graph::FeatureNode;
    use crate::iteration::Example;

    fn store() -> IterationStore {
        IterationStore::new("participant-7", "studio", IterationPolicy::default())
    }

    struct Still(String);
    impl EntityState for Still {
        fn name(&self) -> &str {
            &self.0
        }
        fn position(&self) -> [f32; 3] {
            [0.0; 3]
        }
        fn rotation_euler(&self) -> [f32; 3] {
            [0.0; 3]
        }
        fn rotation_quaternion(&self) -> [f32; 4] {
            [0.0, 0.0, 0.0, 1.0]
        }
    }

    struct FakeModel {
        id: String,
        entity: Still,
    }

    impl FakeModel {
        fn new(id: &str) -> Self {
            Self { id: id.into(), entity: Still("wand".into()) }
        }
    }

    impl ModelSnapshot for FakeModel {
        fn model_id(&self) -> &str {
            &self.id
        }
        fn input_features(&self) -> Vec<FeatureNode> {
            vec![FeatureNode::position("wand position", "wand")]
        }
        fn training_examples(&self) -> Vec<Example> {
            vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])]
        }
        fn testing_examples_by_class(&self) -> Vec<Vec<Example>> {
            vec![vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])]]
        }
        fn entity(&self, name: &str) -> Option<&dyn EntityState> {
            (name == "wand").then_some(&self.entity as &dyn EntityState)
        }
    }

    struct FakeTrainingNode {
        graph: String,
        node: String,
        models: Vec<String>,
        entity: Still,
    }

    impl FakeTrainingNode {
        fn new(graph: &str, node: &str, models: &[&str]) -> Self {
            Self {
                graph: graph.into(),
                node: node.into(),
                models: models.iter().map(|m| m.to_string()).collect(),
                entity: Still("wand".into()),
            }
        }
    }

    impl TrainingSource for FakeTrainingNode {
        fn graph_id(&self) -> &str {
            &self.graph
        }
        fn node_id(&self) -> &str {
            &self.node
        }
        fn input_features(&self) -> Vec<FeatureNode> {
            vec![FeatureNode::position("wand position", "wand")]
        }
        fn target_values(&self) -> Vec<f32> {
            vec![1.0]
        }
        fn connected_model_ids(&self) -> Vec<String> {
            self.models.clone()
        }
        fn entity(&self, name: &str) -> Option<&dyn EntityState> {
            (name == "wand").then_some(&self.entity as &dyn EntityState)
        }
    }

    #[test]
    fn test_get_or_start_is_idempotent() {
        let mut store = store();
        let first = store.get_or_start_iteration("graph-1", "model-1");
        let second = store.get_or_start_iteration("graph-1", "model-1");
        assert_eq!(first, second);
        assert_eq!(store.iterations.len(), 1);
    }

    #[test]
    fn test_distinct_keys_get_distinct_iterations() {
        let mut store = store();
        let a = store.get_or_start_iteration("graph-1", "model-1");
        let b = store.get_or_start_iteration("graph-1", "model-2");
        assert_ne!(a, b);
        assert_eq!(store.iterations.len(), 2);
    }

    #[test]
    fn test_end_opens_fresh_iteration_for_same_key() {
        let mut store = store();
        let first = store.get_or_start_iteration("graph-1", "model-1");
        assert!(store.end_iteration("graph-1", "model-1", None));

        let second = store.get_or_start_iteration("graph-1", "model-1");
        assert_ne!(first, second);
        assert!(store.record(first).unwrap().is_finished());
        assert!(!store.record(second).unwrap().is_finished());
        assert_eq!(store.record(second).unwrap().total_seconds, 0.0);
        assert_eq!(store.num_iterations, 1);
    }

    #[test]
    fn test_end_without_open_iteration_is_logged_noop() {
        let mut store = store();
        assert!(!store.end_iteration("graph-1", "model-1", None));
        assert_eq!(store.num_iterations, 0);
        assert!(store.iterations.is_empty());
    }

    #[test]
    fn test_end_freezes_model_snapshot() {
        let mut store = store();
        store.get_or_start_iteration("graph-1", "model-1");
        let model = FakeModel::new("model-1");
        assert!(store.end_iteration("graph-1", "model-1", Some(&model)));

        let closed = store
            .get_iteration("graph-1", Some("model-1"), false, true)
            .unwrap();
        let record = store.record(closed).unwrap();
        assert_eq!(record.training_examples.len(), 1);
        assert_eq!(record.testing_examples_by_class.len(), 1);
        assert_eq!(record.features_in_use, vec!["wand position"]);
        assert_eq!(record.entities_in_use, vec!["wand"]);
    }

    #[test]
    fn test_orphaned_iteration_claimed_by_single_model() {
        let mut store = store();
        // Iteration opens keyed by the training node because no model is
        // connected yet.
        let unclaimed = FakeTrainingNode::new("graph-1", "training-1", &[]);
        store.save_all_possible_training_features(&unclaimed, 0.1);
        assert_eq!(store.current_record().unwrap().model_id, "training-1");

        // A model appears downstream; the same record is re-keyed, not
        // duplicated.
        let claimed = FakeTrainingNode::new("graph-1", "training-1", &["model-1"]);
        store.save_all_possible_training_features(&claimed, 0.1);
        assert_eq!(store.iterations.len(), 1);
        assert_eq!(store.current_record().unwrap().model_id, "model-1");
    }

    #[test]
    fn test_ambiguous_orphan_stays_with_training_node() {
        let mut store = store();
        let ambiguous = FakeTrainingNode::new("graph-1", "training-1", &["model-1", "model-2"]);
        store.save_all_possible_training_features(&ambiguous, 0.1);
        assert_eq!(store.current_record().unwrap().model_id, "training-1");
        assert!(!store.current_record().unwrap().all_possible_training_features.is_empty());
    }

    #[test]
    fn test_testing_capture_lands_in_current_iteration() {
        let mut store = store();
        let model = FakeModel::new("model-1");
        store.save_all_possible_testing_features("graph-1", &model, 0.1);
        let record = store.current_record().unwrap();
        assert_eq!(record.model_id, "model-1");
        assert_eq!(record.all_possible_testing_features.len(), 9);
        assert!(record.all_possible_training_features.is_empty());
    }

    #[test]
    fn test_rollover_threshold_counts_closed_records() {
        let mut store = store();
        for _ in 0..10 {
            store.get_or_start_iteration("graph-1", "model-1");
            store.end_iteration("graph-1", "model-1", None);
        }
        assert!(!store.needs_rollover());

        store.end_iteration("graph-1", "model-1", None);
        assert!(store.needs_rollover());

        store.retain_open_iterations();
        assert_eq!(store.iterations.len(), 1);
        assert!(!store.current_record().unwrap().is_finished());
        assert!(!store.needs_rollover());
    }

    #[test]
    fn test_store_json_roundtrip() {
        let mut store = store();
        store.get_or_start_iteration("graph-1", "model-1");
        store.end_iteration("graph-1", "model-1", Some(&FakeModel::new("model-1")));

        let json = serde_json::to_string_pretty(&store).unwrap();
        let mut back: IterationStore = serde_json::from_str(&json).unwrap();
        back.set_policy(store.policy());

        assert_eq!(back.project_id, store.project_id);
        assert_eq!(back.num_iterations, store.num_iterations);
        assert_eq!(back.iterations.len(), store.iterations.len());
        for (a, b) in back.iterations.iter().zip(store.iterations.iter()) {
            assert_eq!(a.graph_id, b.graph_id);
            assert_eq!(a.model_id, b.model_id);
            assert_eq!(a.start_time, b.start_time);
            assert_eq!(a.end_time, b.end_time);
            assert_eq!(a.training_examples, b.training_examples);
            assert_eq!(a.testing_examples_by_class, b.testing_examples_by_class);
        }
    }
}
