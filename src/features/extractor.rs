//! Stateful finite-difference derivative extraction
//!
//! One `DerivativeExtractor` turns a stream of feature samples into their
//! rate of change. Chaining two extractors yields acceleration: the second
//! instance consumes the velocity samples produced by the first.
//!
//! The previous-value buffer is overwritten with the just-computed derivative
//! rather than the raw input. This is deliberate and matches the chained
//! design above; a single instance cannot be repointed at a different signal
//! and recompute a plain first derivative afterwards.

use std::collections::HashMap;

use crate::features::FeatureSample;

/// Per-entity, per-order finite-difference engine.
///
/// Not synchronized; each extractor belongs to exactly one store and one
/// sampling role (training or testing).
#[derive(Debug, Default)]
pub struct DerivativeExtractor {
    /// Derivative computed on the previous tick (zeroed on first use)
    last_values: Vec<f32>,
    /// Guard against double-computation within one tick (not currently armed,
    /// kept for parity with the capture loop that owns the tick)
    pub is_updated: bool,
}

impl DerivativeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the discrete derivative of `sample` against the previous tick.
    ///
    /// Returns `None` when the sample is empty or `delta_time` is not a
    /// positive finite number; the internal state is untouched in that case.
    pub fn update(&mut self, sample: &FeatureSample, delta_time: f32) -> Option<Vec<f32>> {
        if sample.values.is_empty() || !delta_time.is_finite() || delta_time <= 0.0 {
            return None;
        }

        // First sample for this entity sizes the buffers; previous is zero.
        if self.last_values.len() != sample.values.len() {
            if !self.last_values.is_empty() {
                return None; // mismatched length mid-stream, refuse to compute
            }
            self.last_values = vec![0.0; sample.values.len()];
        }

        let derivative: Vec<f32> = sample
            .values
            .iter()
            .zip(self.last_values.iter())
            .map(|(current, previous)| (current - previous) / delta_time)
            .collect();

        // The derivative itself becomes the next tick's previous value, so a
        // chained extractor downstream sees the velocity stream.
        self.last_values.clone_from(&derivative);

        Some(derivative)
    }
}

/// The velocity and acceleration extractors for one entity: one first-order
/// and one chained second-order instance per raw signal.
#[derive(Debug, Default)]
pub struct EntityExtractors {
    pub velocity_position: DerivativeExtractor,
    pub acceleration_position: DerivativeExtractor,
    pub velocity_rotation_euler: DerivativeExtractor,
    pub acceleration_rotation_euler: DerivativeExtractor,
    pub velocity_rotation_quaternion: DerivativeExtractor,
    pub acceleration_rotation_quaternion: DerivativeExtractor,
}

impl EntityExtractors {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Lazy per-entity extractor cache for one sampling role.
///
/// Training and testing streams are sampled independently, so each iteration
/// record owns one cache per role.
#[derive(Debug, Default)]
pub struct ExtractorCache {
    extractors: HashMap<String, EntityExtractors>,
}

impl ExtractorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the extractors for `entity`, creating them on first sight
    pub fn get_or_create(&mut self, entity: &str) -> &mut EntityExtractors {
        self.extractors.entry(entity.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
