//! Feature dependency graph model and traversal

pub mod node;
pub mod resolver;

pub use node::{FeatureKind, FeatureNode};
pub use resolver::{
    collect_entity_descriptors, collect_feature_names, resolve_entities,
    resolve_feature_entities,
};
