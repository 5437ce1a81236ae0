//! Per-model accuracy history ledger
//!
//! Append-only except for explicit sort and clear operations; persisted
//! independently of the iteration stores it was computed from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accuracy of one evaluated iteration plus the dataset shape behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationAccuracy {
    /// Held-out accuracy in [0, 1]
    pub accuracy: f32,
    /// When the iteration finished
    pub timestamp: DateTime<Utc>,
    /// Training set size at iteration end
    pub num_training_examples: usize,
    /// Distinct classes in the training set
    pub num_unique_classes: usize,
    /// Features wired into the model
    pub num_features: usize,
    /// Display descriptor of those features
    pub feature_names: String,
}

/// Time-ordered accuracy entries for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracyHistory {
    pub model_id: String,
    pub graph_id: String,
    pub scene_name: String,
    pub accuracy_over_time: Vec<IterationAccuracy>,
}

/// All accuracy histories collected for one participant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantAccuracy {
    /// Anonymised participant identifier
    pub participant_id: String,
    pub histories: Vec<ModelAccuracyHistory>,
}

impl ParticipantAccuracy {
    pub fn new(participant_id: &str) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            histories: Vec::new(),
        }
    }

    /// Appends an entry to the model's bucket, creating the bucket on first
    /// use. Entries are never deduplicated.
    pub fn add_entry(
        &mut self,
        model_id: &str,
        graph_id: &str,
        scene_name: &str,
        entry: IterationAccuracy,
    ) {
        if model_id.is_empty() {
            return;
        }
        if let Some(history) = self
            .histories
            .iter_mut()
            .find(|history| history.model_id == model_id)
        {
            history.accuracy_over_time.push(entry);
        } else {
            self.histories.push(ModelAccuracyHistory {
                model_id: model_id.to_string(),
                graph_id: graph_id.to_string(),
                scene_name: scene_name.to_string(),
                accuracy_over_time: vec![entry],
            });
        }
    }

    pub fn history_for(&self, model_id: &str) -> Option<&ModelAccuracyHistory> {
        self.histories.iter().find(|history| history.model_id == model_id)
    }

    /// Stable-sorts each bucket ascending by timestamp, in place
    pub fn sort_by_time(&mut self) {
        for history in &mut self.histories {
            history
                .accuracy_over_time
                .sort_by_key(|entry| entry.timestamp);
        }
    }

    /// Empties every bucket; the participant identifier is retained
    pub fn clear_all(&mut self) {
        self.histories.clear();
    }
}
