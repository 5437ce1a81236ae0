//! Per-entity capture of the full movement feature catalogue
//!
//! Every capture tick produces nine samples per entity: position, rotation
//! (Euler and quaternion), and the velocity and acceleration of each, with
//! accelerations computed by feeding velocity samples into chained
//! extractors.

use crate::features::{
    DerivativeSource, EntityExtractors, EntityState, FeatureSample,
};

/// Extracts all supported movement features for one entity at one tick.
///
/// `extractors` must be the same instance across ticks for the derivatives to
/// carry state; the caller owns the per-role cache.
pub fn capture_entity_features(
    entity: &dyn EntityState,
    extractors: &mut EntityExtractors,
    delta_time: f32,
    label: &[f32],
) -> Vec<FeatureSample> {
    let mut samples = Vec::with_capacity(9);
    let name = entity.name().to_string();

    // Position, then its velocity, then acceleration chained off the velocity.
    let position = FeatureSample::as_position(entity, label);
    let velocity = derive(
        &mut extractors.velocity_position,
        &position,
        delta_time,
        DerivativeSource::Position,
    );
    let velocity_sample =
        FeatureSample::as_velocity(&name, DerivativeSource::Position, velocity, label);
    let acceleration = derive(
        &mut extractors.acceleration_position,
        &velocity_sample,
        delta_time,
        DerivativeSource::Position,
    );
    samples.push(position);
    samples.push(velocity_sample);
    samples.push(FeatureSample::as_acceleration(
        &name,
        DerivativeSource::Position,
        acceleration,
        label,
    ));

    // Rotation (Euler) chain
    let rotation_euler = FeatureSample::as_rotation_euler(entity, label);
    let velocity = derive(
        &mut extractors.velocity_rotation_euler,
        &rotation_euler,
        delta_time,
        DerivativeSource::RotationEuler,
    );
    let velocity_sample =
        FeatureSample::as_velocity(&name, DerivativeSource::RotationEuler, velocity, label);
    let acceleration = derive(
        &mut extractors.acceleration_rotation_euler,
        &velocity_sample,
        delta_time,
        DerivativeSource::RotationEuler,
    );
    samples.push(rotation_euler);
    samples.push(velocity_sample);
    samples.push(FeatureSample::as_acceleration(
        &name,
        DerivativeSource::RotationEuler,
        acceleration,
        label,
    ));

    // Rotation (Quaternion) chain
    let rotation_quat = FeatureSample::as_rotation_quaternion(entity, label);
    let velocity = derive(
        &mut extractors.velocity_rotation_quaternion,
        &rotation_quat,
        delta_time,
        DerivativeSource::RotationQuaternion,
    );
    let velocity_sample = FeatureSample::as_velocity(
        &name,
        DerivativeSource::RotationQuaternion,
        velocity,
        label,
    );
    let acceleration = derive(
        &mut extractors.acceleration_rotation_quaternion,
        &velocity_sample,
        delta_time,
        DerivativeSource::RotationQuaternion,
    );
    samples.push(rotation_quat);
    samples.push(velocity_sample);
    samples.push(FeatureSample::as_acceleration(
        &name,
        DerivativeSource::RotationQuaternion,
        acceleration,
        label,
    ));

    samples
}

/// Runs one extractor and falls back to a zero vector of the signal's width
/// when the derivative is unavailable (first tick after a length change, bad
/// delta time). Captures must stay rectangular across ticks.
fn derive(
    extractor: &mut crate::features::DerivativeExtractor,
    input: &FeatureSample,
    delta_time: f32,
    source: DerivativeSource,
) -> Vec<f32> {
    extractor
        .update(input, delta_time)
        .filter(|values| values.len() == source.dimension())
        .unwrap_or_else(|| vec![0.0; source.dimension()])
}
