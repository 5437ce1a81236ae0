//! Feature sampling and derivative extraction
//!
//! Leaf data layer of the telemetry crate: flat feature samples read from
//! host entities, and the stateful finite-difference extractors that turn
//! sample streams into velocity and acceleration.

pub mod capture;
pub mod extractor;
pub mod sample;

pub use capture::capture_entity_features;
pub use extractor::{DerivativeExtractor, EntityExtractors, ExtractorCache};
pub use sample::{DerivativeSource, EntityState, FeatureSample};
