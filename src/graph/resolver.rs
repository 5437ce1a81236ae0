//! Feature-graph traversal
//!
//! Resolves which live entities back a set of feature nodes, and collects
//! human-readable feature/entity descriptors for iteration records. The
//! traversal is depth-first, deduplicating, and silently skips node kinds it
//! does not recognize.

use std::collections::BTreeSet;

use crate::graph::{FeatureKind, FeatureNode};

/// Returns the deduplicated set of entities backing `features`.
///
/// Deterministic for a fixed graph and independent of input order; tests
/// compare set equality only.
pub fn resolve_entities(features: &[FeatureNode]) -> BTreeSet<String> {
    let mut entities = BTreeSet::new();
    for feature in features {
        collect_entities(feature, &mut entities);
    }
    entities
}

/// Single-node variant of [`resolve_entities`]
pub fn resolve_feature_entities(feature: &FeatureNode) -> BTreeSet<String> {
    let mut entities = BTreeSet::new();
    collect_entities(feature, &mut entities);
    entities
}

fn collect_entities(feature: &FeatureNode, entities: &mut BTreeSet<String>) {
    match &feature.kind {
        FeatureKind::Position { entity }
        | FeatureKind::RotationEuler { entity }
        | FeatureKind::RotationQuaternion { entity } => {
            entities.insert(entity.clone());
        }
        FeatureKind::DistanceToFirstInput { first_input, second_inputs } => {
            collect_entities(first_input, entities);
            for input in second_inputs {
                collect_entities(input, entities);
            }
        }
        // Chained velocity -> acceleration unwraps recursively.
        FeatureKind::Velocity { input } | FeatureKind::Acceleration { input } => {
            collect_entities(input, entities);
        }
        FeatureKind::Window { inputs } => {
            for input in inputs {
                collect_entities(input, entities);
            }
        }
        // Unknown node kinds contribute nothing; resolution degrades
        // gracefully rather than failing the iteration.
        FeatureKind::Unrecognized => {}
    }
}

/// Collects display names of `features`, flattening derivative chains so a
/// velocity-of-acceleration-of-position lists all three names.
pub fn collect_feature_names(features: &[FeatureNode]) -> Vec<String> {
    let mut names = Vec::new();
    for feature in features {
        push_feature_names(feature, &mut names);
    }
    names
}

fn push_feature_names(feature: &FeatureNode, names: &mut Vec<String>) {
    if let FeatureKind::Unrecognized = feature.kind {
        return;
    }
    names.push(feature.name.clone());
    match &feature.kind {
        FeatureKind::Velocity { input } | FeatureKind::Acceleration { input } => {
            push_feature_names(input, names);
        }
        FeatureKind::Window { inputs } => {
            for input in inputs {
                push_feature_names(input, names);
            }
        }
        _ => {}
    }
}

/// Produces one display descriptor per feature: the backing entity's name, or
/// an underscore-joined composite when several entities back a single node
/// (distance inputs). Purely for display and logging.
pub fn collect_entity_descriptors(features: &[FeatureNode]) -> Vec<String> {
    features
        .iter()
        .filter_map(|feature| {
            let entities = resolve_feature_entities(feature);
            match entities.len() {
                0 => None,
                1 => entities.into_iter().next(),
                _ => Some(
                    entities
                        .into_iter()
                        .collect::<Vec<_>>()
                        .join("_"),
                ),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(entity: &str) -> FeatureNode {
        FeatureNode::position(format!("{entity} position"), entity)
    }

    #[test]
    fn test_leaf_nodes_resolve_to_their_entity() {
        let features = vec![position("head"), position("left hand")];
        let entities = resolve_entities(&features);
        assert_eq!(entities.len(), 2);
        assert!(entities.contains("head"));
        assert!(entities.contains("left hand"));
    }

    #[test]
    fn test_duplicate_entities_deduplicated() {
        let features = vec![
            position("head"),
            FeatureNode::new(
                "head rotation",
                FeatureKind::RotationEuler { entity: "head".into() },
            ),
        ];
        assert_eq!(resolve_entities(&features).len(), 1);
    }

    #[test]
    fn test_velocity_acceleration_chain_unwraps() {
        let chain = FeatureNode::velocity(
            "velocity",
            FeatureNode::acceleration("acceleration", position("wand")),
        );
        let entities = resolve_entities(&[chain]);
        assert_eq!(entities, BTreeSet::from(["wand".to_string()]));
    }

    #[test]
    fn test_distance_node_unions_all_inputs() {
        let distance = FeatureNode::new(
            "distance",
            FeatureKind::DistanceToFirstInput {
                first_input: Box::new(position("head")),
                second_inputs: vec![
                    position("left hand"),
                    FeatureNode::velocity("hand velocity", position("right hand")),
                ],
            },
        );
        let entities = resolve_entities(&[distance]);
        assert_eq!(entities.len(), 3);
    }

    #[test]
    fn test_window_node_unions_members() {
        let window = FeatureNode::new(
            "window",
            FeatureKind::Window {
                inputs: vec![position("a"), position("b")],
            },
        );
        assert_eq!(resolve_entities(&[window]).len(), 2);
    }

    #[test]
    fn test_unrecognized_node_is_silent_noop() {
        let features = vec![
            FeatureNode::new("mystery", FeatureKind::Unrecognized),
            position("head"),
        ];
        let entities = resolve_entities(&features);
        assert_eq!(entities, BTreeSet::from(["head".to_string()]));
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let a = position("a");
        let b = FeatureNode::velocity("vb", position("b"));
        let c = FeatureNode::new(
            "w",
            FeatureKind::Window { inputs: vec![position("c"), position("a")] },
        );
        let forward = resolve_entities(&[a.clone(), b.clone(), c.clone()]);
        let backward = resolve_entities(&[c, b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_feature_names_flatten_derivative_chains() {
        let chain = FeatureNode::velocity(
            "wand velocity",
            FeatureNode::acceleration("wand accel", position("wand")),
        );
        let names = collect_feature_names(&[chain]);
        assert_eq!(names, vec!["wand velocity", "wand accel", "wand position"]);
    }

    #[test]
    fn test_entity_descriptors_join_multi_entity_inputs() {
        let distance = FeatureNode::new(
            "distance",
            FeatureKind::DistanceToFirstInput {
                first_input: Box::new(position("head")),
                second_inputs: vec![position("chest")],
            },
        );
        let descriptors = collect_entity_descriptors(&[distance, position("wand")]);
        assert_eq!(descriptors, vec!["chest_head".to_string(), "wand".to_string()]);
    }
}
