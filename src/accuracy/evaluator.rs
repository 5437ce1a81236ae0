//! Held-out accuracy computation over saved iterations
//!
//! Each closed iteration with both training and testing data gets a freshly
//! trained classifier; testing examples are scored by exact element-wise
//! comparison of the produced output against the recorded expected output.
//! No tolerance is applied: outputs are discrete class encodings.

use tracing::{debug, info, warn};

use crate::accuracy::{Classifier, IterationAccuracy, ParticipantAccuracy};
use crate::iteration::{Example, IterationRecord, IterationStore};

/// Accuracy of one evaluated iteration
#[derive(Debug, Clone, PartialEq)]
pub struct IterationResult {
    pub model_id: String,
    pub accuracy: f32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Result of evaluating every usable iteration in one store
#[derive(Debug, Clone, PartialEq)]
pub struct FileAccuracy {
    pub per_iteration: Vec<IterationResult>,
    /// Mean over every per-class accuracy collected across the file
    pub average: f32,
}

/// Distinct output vectors in order of first appearance
fn unique_classes(examples: &[Example]) -> Vec<Vec<f32>> {
    let mut classes: Vec<Vec<f32>> = Vec::new();
    for example in examples {
        if !classes.iter().any(|class| class == &example.outputs) {
            classes.push(example.outputs.clone());
        }
    }
    classes
}

/// Evaluates every iteration of `store` with `classifier`, appending one
/// history entry per processed iteration into `history`.
///
/// Iterations whose testing groups disagree with the training set's class
/// count are skipped as malformed, not treated as errors. Returns `None`
/// when no iteration in the store was usable.
pub fn evaluate_store(
    store: &IterationStore,
    classifier: &mut dyn Classifier,
    history: &mut ParticipantAccuracy,
) -> Option<FileAccuracy> {
    let mut per_iteration = Vec::new();
    let mut class_accuracies: Vec<f32> = Vec::new();

    for record in &store.iterations {
        if record.training_examples.is_empty() || record.testing_examples_by_class.is_empty() {
            continue;
        }
        // Only closed iterations are scored; an open record with data must
        // not contribute class accuracies to the file average.
        let Some(timestamp) = record.end_time else {
            continue;
        };
        if let Some(result) = evaluate_iteration(record, classifier, timestamp, &mut class_accuracies)
        {
            history.add_entry(
                &record.model_id,
                &record.graph_id,
                &record.scene_name,
                IterationAccuracy {
                    accuracy: result.accuracy,
                    timestamp,
                    num_training_examples: record.training_examples.len(),
                    num_unique_classes: record.testing_examples_by_class.len(),
                    num_features: record.features_in_use.len(),
                    feature_names: record.features_in_use.join(", "),
                },
            );
            info!(
                "Accuracy was {:.3} for model {} at {timestamp}",
                result.accuracy, result.model_id
            );
            per_iteration.push(result);
        }
    }

    if per_iteration.is_empty() {
        warn!(
            "No iteration with usable training and testing data in store for \
             project {}, scene {}",
            store.project_id, store.scene_name
        );
        return None;
    }

    let average = class_accuracies.iter().sum::<f32>() / class_accuracies.len() as f32;
    info!("Average accuracy of {} iterations is {average:.3}", per_iteration.len());
    Some(FileAccuracy { per_iteration, average })
}

/// Trains and scores one iteration; pushes each class's accuracy into
/// `class_accuracies`. Zero-example class groups are excluded, never NaN.
fn evaluate_iteration(
    record: &IterationRecord,
    classifier: &mut dyn Classifier,
    timestamp: chrono::DateTime<chrono::Utc>,
    class_accuracies: &mut Vec<f32>,
) -> Option<IterationResult> {
    // Fresh training per iteration; nothing carries over.
    classifier.clear_training_examples();
    for example in &record.training_examples {
        classifier.add_training_example(&example.inputs, &example.outputs);
    }
    if !classifier.train() {
        warn!("Classifier failed to train on iteration of model {}", record.model_id);
        return None;
    }

    let num_unique_classes = unique_classes(&record.training_examples).len();
    if num_unique_classes != record.testing_examples_by_class.len() {
        debug!(
            "Testing groups ({}) disagree with unique classes ({}), iteration of \
             model {} excluded",
            record.testing_examples_by_class.len(),
            num_unique_classes,
            record.model_id
        );
        return None;
    }

    let mut total_hits = 0usize;
    let mut total_misses = 0usize;
    for group in &record.testing_examples_by_class {
        let mut hits = 0usize;
        let mut misses = 0usize;
        for example in group {
            let output = classifier.run(&example.inputs, example.outputs.len());
            if output == example.outputs {
                hits += 1;
            } else {
                misses += 1;
            }
        }
        // A class with no testing examples contributes no accuracy sample.
        if hits + misses > 0 {
            class_accuracies.push(hits as f32 / (hits + misses) as f32);
        }
        total_hits += hits;
        total_misses += misses;
    }

    if total_hits + total_misses == 0 {
        return None;
    }

    Some(IterationResult {
        model_id: record.model_id.clone(),
        accuracy: total_hits as f32 / (total_hits + total_misses) as f32,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accuracy::NearestNeighborClassifier;
    use crate::iteration::IterationPolicy;

    fn store_with_iteration(
        training: Vec<Example>,
        testing: Vec<Vec<Example>>,
    ) -> IterationStore {
        let mut store = IterationStore::new("p-01", "studio", IterationPolicy::default());
        let index = store.get_or_start_iteration("graph-1", "model-1");
        {
            let record = store.record_mut(index).unwrap();
            record.training_examples = training;
            record.testing_examples_by_class = testing;
        }
        store.end_iteration("graph-1", "model-1", None);
        store
    }

    fn two_class_training() -> Vec<Example> {
        vec![
            Example::new(vec![0.0, 0.0], vec![1.0, 0.0]),
            Example::new(vec![1.0, 1.0], vec![0.0, 1.0]),
        ]
    }

    #[test]
    fn test_matching_testing_set_scores_perfect() {
        let store = store_with_iteration(
            two_class_training(),
            vec![
                vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])],
                vec![Example::new(vec![1.0, 1.0], vec![0.0, 1.0])],
            ],
        );
        let mut history = ParticipantAccuracy::new("p-01");
        let mut knn = NearestNeighborClassifier::new();
        let result = evaluate_store(&store, &mut knn, &mut history).unwrap();

        assert_eq!(result.per_iteration.len(), 1);
        assert_eq!(result.per_iteration[0].accuracy, 1.0);
        assert_eq!(result.average, 1.0);
        assert_eq!(history.history_for("model-1").unwrap().accuracy_over_time.len(), 1);
    }

    #[test]
    fn test_swapped_expected_output_halves_average() {
        let store = store_with_iteration(
            two_class_training(),
            vec![
                vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])],
                // Class B's expected output is swapped; the classifier's
                // (correct) answer counts as a miss.
                vec![Example::new(vec![1.0, 1.0], vec![1.0, 0.0])],
            ],
        );
        let mut history = ParticipantAccuracy::new("p-01");
        let mut knn = NearestNeighborClassifier::new();
        let result = evaluate_store(&store, &mut knn, &mut history).unwrap();

        assert_eq!(result.average, 0.5);
        assert_eq!(result.per_iteration[0].accuracy, 0.5);
    }

    #[test]
    fn test_empty_class_group_excluded_not_nan() {
        let store = store_with_iteration(
            two_class_training(),
            vec![
                vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])],
                vec![],
            ],
        );
        let mut history = ParticipantAccuracy::new("p-01");
        let mut knn = NearestNeighborClassifier::new();
        let result = evaluate_store(&store, &mut knn, &mut history).unwrap();

        assert!(result.average.is_finite());
        assert_eq!(result.average, 1.0);
    }

    #[test]
    fn test_group_count_mismatch_skips_iteration() {
        let store = store_with_iteration(
            two_class_training(),
            vec![vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])]],
        );
        let mut history = ParticipantAccuracy::new("p-01");
        let mut knn = NearestNeighborClassifier::new();
        assert!(evaluate_store(&store, &mut knn, &mut history).is_none());
        assert!(history.histories.is_empty());
    }

    #[test]
    fn test_open_iteration_with_data_excluded_from_average() {
        // One closed, perfectly-scoring iteration...
        let mut store = store_with_iteration(
            two_class_training(),
            vec![
                vec![Example::new(vec![0.0, 0.0], vec![1.0, 0.0])],
                vec![Example::new(vec![1.0, 1.0], vec![0.0, 1.0])],
            ],
        );
        // ...plus the reopened record, filled with data that would score
        // zero, but never ended.
        {
            let index = store.current_index().unwrap();
            let record = store.record_mut(index).unwrap();
            record.training_examples = two_class_training();
            record.testing_examples_by_class = vec![
                vec![Example::new(vec![0.0, 0.0], vec![0.0, 1.0])],
                vec![Example::new(vec![1.0, 1.0], vec![1.0, 0.0])],
            ];
        }

        let mut history = ParticipantAccuracy::new("p-01");
        let mut knn = NearestNeighborClassifier::new();
        let result = evaluate_store(&store, &mut knn, &mut history).unwrap();

        assert_eq!(result.per_iteration.len(), 1);
        assert_eq!(result.average, 1.0);
        assert_eq!(history.history_for("model-1").unwrap().accuracy_over_time.len(), 1);
    }

    #[test]
    fn test_iterations_without_data_skipped() {
        let mut store = IterationStore::new("p-01", "studio", IterationPolicy::default());
        store.get_or_start_iteration("graph-1", "model-1");
        store.end_iteration("graph-1", "model-1", None);

        let mut history = ParticipantAccuracy::new("p-01");
        let mut knn = NearestNeighborClassifier::new();
        assert!(evaluate_store(&store, &mut knn, &mut history).is_none());
    }

    #[test]
    fn test_unique_classes_counts_distinct_outputs() {
        let examples = vec![
            Example::new(vec![0.0], vec![1.0, 0.0]),
            Example::new(vec![0.1], vec![1.0, 0.0]),
            Example::new(vec![1.0], vec![0.0, 1.0]),
        ];
        assert_eq!(unique_classes(&examples).len(), 2);
    }
}
