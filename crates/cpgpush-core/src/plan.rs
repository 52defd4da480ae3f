//! Depth-bounded save planning.
//!
//! A [`SavePlan`] is the exact set of node and relationship rows one bulk
//! save writes. Pushed nodes are always written; [`SaveDepth`] bounds how many
//! relationship hops away from the pushed set are serialized with them.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{CpgGraph, NodeId, Properties, PropertyValue};

/// Label carried by every persisted node.
pub const BASE_LABEL: &str = "Node";

/// Relationship fan-out serialized per pushed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveDepth {
    /// Full transitive closure of relationships.
    #[default]
    Unbounded,
    /// At most this many relationship hops from a pushed node.
    Limited(u32),
}

impl SaveDepth {
    /// Parse the `-1 = unlimited` integer convention.
    pub fn from_i64(depth: i64) -> Result<Self, CoreError> {
        match depth {
            -1 => Ok(Self::Unbounded),
            d if d >= 0 => u32::try_from(d)
                .map(Self::Limited)
                .map_err(|_| CoreError::InvalidDepth(depth)),
            _ => Err(CoreError::InvalidDepth(depth)),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unbounded => -1,
            Self::Limited(d) => i64::from(d),
        }
    }

    /// Whether relationships of a node `distance` hops from the pushed set
    /// are serialized.
    fn expands(self, distance: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Limited(max) => distance < max,
        }
    }
}

impl fmt::Display for SaveDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unlimited"),
            Self::Limited(d) => write!(f, "{d}"),
        }
    }
}

impl Serialize for SaveDepth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for SaveDepth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::from_i64(raw).map_err(serde::de::Error::custom)
    }
}

/// A node row of a save plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNode {
    pub id: NodeId,
    /// Sorted, deduplicated, always containing [`BASE_LABEL`].
    pub labels: Vec<String>,
    pub properties: Properties,
}

/// A relationship row of a save plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRelationship {
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: String,
    pub properties: Properties,
}

/// Everything one bulk save writes.
#[derive(Debug, Clone)]
pub struct SavePlan {
    pub run_id: Uuid,
    pub depth: SaveDepth,
    /// Number of nodes pushed by the caller (before relationship expansion).
    pub pushed: usize,
    pub nodes: Vec<PlannedNode>,
    pub relationships: Vec<PlannedRelationship>,
}

impl SavePlan {
    /// Plan the save of `pushed` with relationship fan-out bounded by `depth`.
    ///
    /// Runs a multi-source breadth-first search with every pushed node at
    /// distance 0. A node's outgoing relationships are serialized iff its
    /// distance is below the depth bound; every serialized relationship's
    /// target is written as a node.
    pub fn build(graph: &CpgGraph, pushed: &[NodeId], depth: SaveDepth) -> Result<Self, CoreError> {
        let mut distance: HashMap<NodeId, u32> = HashMap::with_capacity(pushed.len());
        let mut order: Vec<NodeId> = Vec::with_capacity(pushed.len());
        let mut queue = VecDeque::new();

        for &id in pushed {
            if !graph.contains(id) {
                return Err(CoreError::UnknownNode(id));
            }
            if distance.insert(id, 0).is_none() {
                order.push(id);
                queue.push_back(id);
            }
        }
        let pushed_count = order.len();

        let mut relationships = Vec::new();
        while let Some(id) = queue.pop_front() {
            let d = distance[&id];
            if !depth.expands(d) {
                continue;
            }
            for rel in graph.relationships(id) {
                if !graph.contains(rel.target) {
                    return Err(CoreError::DanglingReference {
                        node: id,
                        missing: rel.target,
                    });
                }
                let mut properties = rel.properties.cloned().unwrap_or_default();
                if let Some(index) = rel.ast_index {
                    properties.insert("index".to_string(), PropertyValue::Int(index as i64));
                }
                relationships.push(PlannedRelationship {
                    source: id,
                    target: rel.target,
                    rel_type: rel.rel_type.to_string(),
                    properties,
                });
                if !distance.contains_key(&rel.target) {
                    distance.insert(rel.target, d + 1);
                    order.push(rel.target);
                    queue.push_back(rel.target);
                }
            }
        }

        let nodes = order
            .into_iter()
            .filter_map(|id| {
                graph.node(id).map(|node| PlannedNode {
                    id,
                    labels: normalize_labels(&node.labels),
                    properties: node.properties.clone(),
                })
            })
            .collect();

        Ok(Self {
            run_id: Uuid::new_v4(),
            depth,
            pushed: pushed_count,
            nodes,
            relationships,
        })
    }

    /// Row key of a planned node, unique across runs. Never stored as a property.
    pub fn key(&self, id: NodeId) -> String {
        format!("{}:{}", self.run_id, id.0)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn normalize_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = labels
        .iter()
        .filter(|l| !l.is_empty())
        .cloned()
        .collect();
    out.push(BASE_LABEL.to_string());
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphNode;

    /// Chain a -> b -> c -> d over mixed AST and EOG edges, plus an
    /// unreachable node e.
    fn chain() -> (CpgGraph, Vec<NodeId>) {
        let mut graph = CpgGraph::new();
        let a = graph.add_node(GraphNode::new(["TranslationUnitDeclaration"]));
        let b = graph.add_node(GraphNode::new(["FunctionDeclaration"]));
        let c = graph.add_node(GraphNode::new(["CallExpression"]));
        let d = graph.add_node(GraphNode::new(["FunctionDeclaration"]));
        let e = graph.add_node(GraphNode::new(["Literal"]));
        graph.add_ast_child(a, b).unwrap();
        graph.add_edge(b, "EOG", c, Properties::new()).unwrap();
        graph.add_edge(c, "INVOKES", d, Properties::new()).unwrap();
        (graph, vec![a, b, c, d, e])
    }

    #[test]
    fn test_depth_from_i64() {
        assert_eq!(SaveDepth::from_i64(-1).unwrap(), SaveDepth::Unbounded);
        assert_eq!(SaveDepth::from_i64(0).unwrap(), SaveDepth::Limited(0));
        assert_eq!(SaveDepth::from_i64(3).unwrap(), SaveDepth::Limited(3));
        assert!(matches!(SaveDepth::from_i64(-2), Err(CoreError::InvalidDepth(-2))));
        assert_eq!(SaveDepth::Unbounded.as_i64(), -1);
    }

    #[test]
    fn test_depth_zero_writes_no_relationships() {
        let (graph, ids) = chain();
        let plan = SavePlan::build(&graph, &[ids[0], ids[2]], SaveDepth::Limited(0)).unwrap();
        assert!(plan.relationships.is_empty());
        let written: Vec<_> = plan.nodes.iter().map(|n| n.id).collect();
        assert_eq!(written, vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_depth_one_writes_direct_relationships_and_targets() {
        let (graph, ids) = chain();
        let plan = SavePlan::build(&graph, &[ids[0]], SaveDepth::Limited(1)).unwrap();
        assert_eq!(plan.relationships.len(), 1);
        assert_eq!(plan.relationships[0].rel_type, "AST");
        assert_eq!(plan.relationships[0].properties.get("index"), Some(&PropertyValue::Int(0)));
        let written: Vec<_> = plan.nodes.iter().map(|n| n.id).collect();
        assert_eq!(written, vec![ids[0], ids[1]]);
        assert_eq!(plan.pushed, 1);
    }

    #[test]
    fn test_unbounded_depth_writes_transitive_closure() {
        let (graph, ids) = chain();
        let plan = SavePlan::build(&graph, &[ids[0]], SaveDepth::Unbounded).unwrap();
        let types: Vec<_> = plan.relationships.iter().map(|r| r.rel_type.as_str()).collect();
        assert_eq!(types, vec!["AST", "EOG", "INVOKES"]);
        assert_eq!(plan.nodes.len(), 4);
        assert!(plan.nodes.iter().all(|n| n.id != ids[4]));
    }

    #[test]
    fn test_depth_never_drops_pushed_nodes() {
        let (graph, ids) = chain();
        for depth in [SaveDepth::Limited(0), SaveDepth::Limited(2), SaveDepth::Unbounded] {
            let plan = SavePlan::build(&graph, &ids, depth).unwrap();
            assert_eq!(plan.nodes.len(), ids.len());
            assert_eq!(plan.pushed, ids.len());
        }
    }

    #[test]
    fn test_relationships_are_written_once_across_pushed_nodes() {
        let (graph, ids) = chain();
        // b is both pushed and reachable from a; its EOG edge must not repeat.
        let plan = SavePlan::build(&graph, &[ids[0], ids[1], ids[0]], SaveDepth::Unbounded).unwrap();
        assert_eq!(plan.relationships.len(), 3);
        assert_eq!(plan.pushed, 2);
    }

    #[test]
    fn test_labels_are_normalized_with_base_label() {
        let (graph, ids) = chain();
        let plan = SavePlan::build(&graph, &[ids[4]], SaveDepth::Limited(0)).unwrap();
        assert_eq!(plan.nodes[0].labels, vec!["Literal".to_string(), "Node".to_string()]);
    }

    #[test]
    fn test_unknown_pushed_node_is_rejected() {
        let (graph, _) = chain();
        let err = SavePlan::build(&graph, &[NodeId(99)], SaveDepth::Unbounded).unwrap_err();
        assert!(matches!(err, CoreError::UnknownNode(NodeId(99))));
    }

    #[test]
    fn test_keys_are_scoped_to_the_run() {
        let (graph, ids) = chain();
        let first = SavePlan::build(&graph, &ids, SaveDepth::Limited(0)).unwrap();
        let second = SavePlan::build(&graph, &ids, SaveDepth::Limited(0)).unwrap();
        assert_ne!(first.key(ids[0]), second.key(ids[0]));
        assert!(first.key(ids[2]).ends_with(":2"));
    }
}
