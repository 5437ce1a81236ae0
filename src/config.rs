//! Configuration for the telemetry layer
//!
//! Policy knobs and upload settings live in a TOML file inside the data
//! directory; a missing file yields the defaults. Nothing here is persisted
//! with the telemetry itself.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::iteration::IterationPolicy;

/// Full configuration for one telemetry session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Identifier stamped on every file this session writes
    pub project_id: String,
    /// Scene or task the participant is steering in
    pub scene_name: String,
    /// Where telemetry files are written; defaults under the home directory
    pub data_dir: PathBuf,
    pub iteration: IterationConfig,
    pub upload: UploadConfig,
}

/// Iteration lifecycle knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationConfig {
    /// Open iterations older than this are abandoned rather than resumed
    pub staleness_hours: f64,
    /// Finished iterations kept in the active file before archiving
    pub rollover_threshold: usize,
}

impl Default for IterationConfig {
    fn default() -> Self {
        let policy = IterationPolicy::default();
        Self {
            staleness_hours: policy.staleness_hours,
            rollover_threshold: policy.rollover_threshold,
        }
    }
}

/// Collection server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Whether files are sent to the collection server at all
    pub enabled: bool,
    pub server_url: String,
    /// Server-side grouping for this study's files
    pub bucket: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: String::new(),
            bucket: "telemetry".to_string(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            project_id: "unnamed-project".to_string(),
            scene_name: "default".to_string(),
            data_dir: default_data_dir(),
            iteration: IterationConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// The policy derived from this configuration
    pub fn iteration_policy(&self) -> IterationPolicy {
        IterationPolicy {
            staleness_hours: self.iteration.staleness_hours,
            rollover_threshold: self.iteration.rollover_threshold,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".steertrace")
}

/// Load configuration from file, falling back to defaults when absent
pub fn load_config(config_path: &Path) -> Result<TelemetryConfig> {
    if !config_path.exists() {
        return Ok(TelemetryConfig::default());
    }

    let content = std::fs::read_to_string(config_path)?;
    let config: TelemetryConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &TelemetryConfig, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(config_path, content)?;
    info!("Saved configuration to {:?}", config_path);
    Ok(())
}
