//! JSON persistence for iteration stores and accuracy ledgers
//!
//! One active file per (project, scene) pair holds the live store; finished
//! iterations past the rollover threshold are moved into timestamped
//! archives so the active file stays small. Disk I/O runs on blocking
//! threads; a busy flag rejects overlapping load/save attempts instead of
//! queuing them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::accuracy::ParticipantAccuracy;
use crate::iteration::{IterationPolicy, IterationStore};

/// Failures surfaced by the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("a load or save is already in progress")]
    Busy,
    #[error("telemetry file not found: {0}")]
    NotFound(PathBuf),
    #[error("telemetry file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// File layout and busy gate for one telemetry data directory
#[derive(Debug, Clone)]
pub struct TelemetryFiles {
    dir: PathBuf,
    busy: Arc<AtomicBool>,
}

impl TelemetryFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True while a load or save holds the gate
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Active file for one (project, scene) pair
    pub fn store_path(&self, project_id: &str, scene_name: &str) -> PathBuf {
        self.dir.join(format!("{project_id}_{scene_name}.json"))
    }

    pub fn accuracy_path(&self, participant_id: &str) -> PathBuf {
        self.dir.join(format!("{participant_id}_accuracy.json"))
    }

    fn acquire(&self) -> Result<BusyGuard, PersistenceError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(PersistenceError::Busy);
        }
        Ok(BusyGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    /// Writes the store to its active file, creating the directory on
    /// first use.
    pub fn save_store(&self, store: &IterationStore) -> Result<(), PersistenceError> {
        let _guard = self.acquire()?;
        fs::create_dir_all(&self.dir)?;
        let path = self.store_path(&store.project_id, &store.scene_name);
        write_json(&path, store)?;
        debug!(
            "Saved {} iterations to {path:?}",
            store.iterations.len()
        );
        Ok(())
    }

    /// Reads the active file for one (project, scene) pair, restoring the
    /// given policy (policies are configuration, never persisted).
    pub fn load_store(
        &self,
        project_id: &str,
        scene_name: &str,
        policy: IterationPolicy,
    ) -> Result<IterationStore, PersistenceError> {
        let _guard = self.acquire()?;
        let path = self.store_path(project_id, scene_name);
        let mut store = read_store(&path)?;
        store.set_policy(policy);
        info!(
            "Loaded {} iterations for project {project_id}, scene {scene_name}",
            store.iterations.len()
        );
        Ok(store)
    }

    /// Archives finished iterations once the store exceeds its rollover
    /// threshold. The whole active file is copied into a timestamped
    /// archive, then the store is trimmed to its open iterations and the
    /// active file rewritten. Returns the archive path when a rollover
    /// happened.
    pub fn maybe_rollover(
        &self,
        store: &mut IterationStore,
    ) -> Result<Option<PathBuf>, PersistenceError> {
        if !store.needs_rollover() {
            return Ok(None);
        }
        let _guard = self.acquire()?;
        fs::create_dir_all(&self.dir)?;

        let archive = self.dir.join(format!(
            "{}_{}_{}.json",
            store.project_id,
            store.scene_name,
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        write_json(&archive, store)?;
        info!(
            "Rolled {} finished iterations into {archive:?}",
            store.finished_count()
        );

        store.retain_open_iterations();
        let active = self.store_path(&store.project_id, &store.scene_name);
        write_json(&active, store)?;
        Ok(Some(archive))
    }

    pub fn save_accuracy(&self, data: &ParticipantAccuracy) -> Result<(), PersistenceError> {
        let _guard = self.acquire()?;
        fs::create_dir_all(&self.dir)?;
        write_json(&self.accuracy_path(&data.participant_id), data)?;
        Ok(())
    }

    pub fn load_accuracy(
        &self,
        participant_id: &str,
    ) -> Result<ParticipantAccuracy, PersistenceError> {
        let _guard = self.acquire()?;
        let path = self.accuracy_path(participant_id);
        if !path.exists() {
            return Err(PersistenceError::NotFound(path));
        }
        let data = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(data)
    }

    /// Every `.json` store file under the data directory, active and
    /// archived alike. Accuracy ledgers are excluded.
    pub fn list_store_files(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let mut files = Vec::new();
        if !self.dir.exists() {
            return Ok(files);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            let is_accuracy = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.ends_with("_accuracy"));
            if is_json && !is_accuracy {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Loads every store file off the blocking pool, skipping files that
    /// fail to parse. Used for retrospective evaluation across sessions.
    ///
    /// Holds the busy gate for the whole load, so saves arriving while the
    /// bulk read is in flight are rejected rather than interleaved.
    pub async fn load_all_stores(&self) -> Result<Vec<IterationStore>> {
        let guard = self.acquire()?;
        let files = self.list_store_files()?;
        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut stores = Vec::with_capacity(files.len());
            for path in files {
                match read_store(&path) {
                    Ok(store) => stores.push(store),
                    Err(err) => warn!("Skipping unreadable store {path:?}: {err}"),
                }
            }
            stores
        });
        handle.await.context("store loading task panicked")
    }
}

/// Clears the busy flag when a load or save finishes, panics included
struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn read_store(path: &Path) -> Result<IterationStore, PersistenceError> {
    if !path.exists() {
        return Err(PersistenceError::NotFound(path.to_path_buf()));
    }
    let store = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(store)
}
