//! steertrace - embedded telemetry and evaluation for interactive ML steering
//!
//! Records what a participant does while iteratively training a model:
//! which features their graph uses, every training and held-out testing
//! example, and how long each steering iteration took. Stores are plain
//! JSON files that roll over into timestamped archives, can be uploaded to
//! a collection server, and can be replayed later to score each iteration's
//! model against its held-out examples.

pub mod accuracy;
pub mod config;
pub mod features;
pub mod graph;
pub mod iteration;
pub mod persistence;
pub mod session;
pub mod upload;

pub use accuracy::{
    evaluate_store, Classifier, FileAccuracy, IterationAccuracy, IterationResult,
    ModelAccuracyHistory, NearestNeighborClassifier, ParticipantAccuracy,
};
pub use config::{load_config, save_config, TelemetryConfig};
pub use features::{
    capture_entity_features, DerivativeExtractor, DerivativeSource, EntityExtractors,
    EntityState, ExtractorCache, FeatureSample,
};
pub use graph::{resolve_entities, FeatureKind, FeatureNode};
pub use iteration::{
    Example, IterationPolicy, IterationRecord, IterationStore, ModelSnapshot, TrainingSource,
};
pub use persistence::{PersistenceError, TelemetryFiles};
pub use session::{SessionObserver, TelemetrySession};
pub use upload::Uploader;
