//! Session controller tying the telemetry pieces together
//!
//! Owns the live iteration store, reacts to recording start/stop signals
//! from the steering UI, persists after every closed iteration, and hands
//! finished files to the uploader. Interested parties register an observer
//! rather than hooking global callbacks.

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::accuracy::{evaluate_store, Classifier, FileAccuracy, ParticipantAccuracy};
use crate::config::TelemetryConfig;
use crate::iteration::{IterationStore, ModelSnapshot, TrainingSource};
use crate::persistence::{PersistenceError, TelemetryFiles};
use crate::upload::Uploader;

/// Receives lifecycle notifications from a [`TelemetrySession`]
pub trait SessionObserver: Send {
    fn iteration_started(&mut self, graph_id: &str, model_id: &str);
    fn iteration_ended(&mut self, graph_id: &str, model_id: &str);
}

/// One participant's telemetry session
pub struct TelemetrySession {
    config: TelemetryConfig,
    store: IterationStore,
    files: TelemetryFiles,
    uploader: Option<Uploader>,
    observers: Vec<Box<dyn SessionObserver>>,
    collecting: bool,
}

impl TelemetrySession {
    /// Resumes the on-disk store for this (project, scene) pair, or starts
    /// a fresh one when no file exists yet.
    pub fn new(config: TelemetryConfig) -> Self {
        let files = TelemetryFiles::new(&config.data_dir);
        let policy = config.iteration_policy();
        let store = match files.load_store(&config.project_id, &config.scene_name, policy) {
            Ok(store) => {
                info!(
                    "Resumed telemetry for project {}, scene {}",
                    config.project_id, config.scene_name
                );
                store
            }
            Err(PersistenceError::NotFound(_)) => {
                IterationStore::new(&config.project_id, &config.scene_name, policy)
            }
            Err(err) => {
                warn!("Could not load existing telemetry, starting fresh: {err}");
                IterationStore::new(&config.project_id, &config.scene_name, policy)
            }
        };
        let uploader = config
            .upload
            .enabled
            .then(|| Uploader::new(&config.upload.server_url, &config.upload.bucket));

        Self {
            config,
            store,
            files,
            uploader,
            observers: Vec::new(),
            collecting: false,
        }
    }

    pub fn store(&self) -> &IterationStore {
        &self.store
    }

    pub fn files(&self) -> &TelemetryFiles {
        &self.files
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn enable_collection(&mut self) {
        self.collecting = true;
        info!("Telemetry collection enabled");
    }

    pub fn disable_collection(&mut self) {
        self.collecting = false;
        info!("Telemetry collection disabled");
    }

    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Drops every registered observer
    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Signals that recording began for a model. Ensures an open iteration
    /// exists for the (graph, model) key.
    pub fn record_started(&mut self, graph_id: &str, model_id: &str) {
        if !self.collecting {
            return;
        }
        self.store.get_or_start_iteration(graph_id, model_id);
        for observer in &mut self.observers {
            observer.iteration_started(graph_id, model_id);
        }
    }

    /// Signals that recording stopped. Closes the iteration, freezing the
    /// model's state into it, then persists and (optionally) uploads.
    pub fn record_stopped(
        &mut self,
        graph_id: &str,
        model_id: &str,
        model: Option<&dyn ModelSnapshot>,
    ) {
        if !self.collecting {
            return;
        }
        if !self.store.end_iteration(graph_id, model_id, model) {
            return;
        }
        for observer in &mut self.observers {
            observer.iteration_ended(graph_id, model_id);
        }
        self.persist_and_upload();
    }

    /// Per-frame capture of everything the training node could be using
    pub fn capture_training_features(&mut self, source: &dyn TrainingSource, delta_time: f32) {
        if !self.collecting {
            return;
        }
        self.store
            .save_all_possible_training_features(source, delta_time);
    }

    /// Per-frame capture of held-out testing features while a model runs
    pub fn capture_testing_features(
        &mut self,
        graph_id: &str,
        model: &dyn ModelSnapshot,
        delta_time: f32,
    ) {
        if !self.collecting {
            return;
        }
        self.store
            .save_all_possible_testing_features(graph_id, model, delta_time);
    }

    /// Writes the active file, archiving finished iterations first when the
    /// store is over its rollover threshold. Archived files are handed to
    /// the uploader in the background.
    fn persist_and_upload(&mut self) {
        match self.files.maybe_rollover(&mut self.store) {
            Ok(Some(archive)) => {
                if let Some(uploader) = &self.uploader {
                    uploader.upload_file_detached(&archive);
                }
            }
            Ok(None) => {}
            Err(err) => error!("Rollover failed: {err}"),
        }
        if let Err(err) = self.files.save_store(&self.store) {
            error!("Could not persist telemetry: {err}");
            return;
        }
        if let Some(uploader) = &self.uploader {
            let active = self
                .files
                .store_path(&self.store.project_id, &self.store.scene_name);
            uploader.upload_file_detached(&active);
        }
    }

    /// Evaluates every store file in the data directory with `classifier`,
    /// active and archived alike, writing the accuracy ledger back to disk.
    pub async fn evaluate_all_files(
        &self,
        classifier: &mut dyn Classifier,
    ) -> Result<Vec<FileAccuracy>> {
        let stores = self.files.load_all_stores().await?;
        let mut ledger = ParticipantAccuracy::new(&self.config.project_id);
        let mut results = Vec::new();
        for store in &stores {
            if let Some(accuracy) = evaluate_store(store, classifier, &mut ledger) {
                results.push(accuracy);
            }
        }
        ledger.sort_by_time();
        if results.is_empty() {
            debug!("No file produced an accuracy result");
        } else if let Err(err) = self.files.save_accuracy(&ledger) {
            error!("Could not persist accuracy ledger: {err}");
        }
        Ok(results)
    }

    /// Sends every file in the data directory to the collection server
    pub async fn upload_all(&self) -> Result<usize> {
        let Some(uploader) = &self.uploader else {
            debug!("Upload disabled, nothing sent");
            return Ok(0);
        };
        uploader.upload_directory(self.files.dir()).await
    }
}
