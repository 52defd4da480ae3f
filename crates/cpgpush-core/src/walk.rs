//! AST walking: root deduplication and subgraph flattening.

use std::collections::HashSet;

use crate::types::{CpgGraph, NodeId, RootNode};

/// Deduplicate roots by identity, keeping first-seen order.
pub fn unique_roots(roots: &[RootNode]) -> Vec<RootNode> {
    let mut seen = HashSet::with_capacity(roots.len());
    roots.iter().copied().filter(|r| seen.insert(*r)).collect()
}

/// Flatten the AST below `root` in pre-order.
///
/// Each node appears once even if it is shared between parents or the AST
/// contains a cycle. Handles that do not resolve in `graph` are skipped.
pub fn flatten_ast(graph: &CpgGraph, root: NodeId) -> Vec<NodeId> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    walk_into(graph, root, &mut visited, &mut out);
    out
}

/// Flatten every root into one combined, duplicate-free node list.
pub fn flatten_roots(graph: &CpgGraph, roots: &[RootNode]) -> Vec<NodeId> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    for root in roots {
        walk_into(graph, root.node_id(), &mut visited, &mut out);
    }
    out
}

fn walk_into(
    graph: &CpgGraph,
    start: NodeId,
    visited: &mut HashSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let Some(node) = graph.node(id) else {
            tracing::warn!(node = %id, "Skipping unknown AST node");
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        out.push(id);
        // Reverse so the first child is popped next.
        stack.extend(node.ast_children.iter().rev().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphNode;

    /// tu -> [f -> [p, body], g]
    fn small_unit(graph: &mut CpgGraph) -> (NodeId, Vec<NodeId>) {
        let tu = graph.add_node(GraphNode::new(["TranslationUnitDeclaration"]));
        let f = graph.add_node(GraphNode::new(["FunctionDeclaration"]));
        let p = graph.add_node(GraphNode::new(["ParamVariableDeclaration"]));
        let body = graph.add_node(GraphNode::new(["CompoundStatement"]));
        let g = graph.add_node(GraphNode::new(["FunctionDeclaration"]));
        graph.add_ast_child(tu, f).unwrap();
        graph.add_ast_child(f, p).unwrap();
        graph.add_ast_child(f, body).unwrap();
        graph.add_ast_child(tu, g).unwrap();
        (tu, vec![tu, f, p, body, g])
    }

    #[test]
    fn test_flatten_is_preorder() {
        let mut graph = CpgGraph::new();
        let (tu, expected) = small_unit(&mut graph);
        assert_eq!(flatten_ast(&graph, tu), expected);
    }

    #[test]
    fn test_flatten_survives_cycles_and_sharing() {
        let mut graph = CpgGraph::new();
        let (tu, expected) = small_unit(&mut graph);
        // Back edge to the root and a second parent for `g`.
        graph.add_ast_child(expected[3], tu).unwrap();
        graph.add_ast_child(expected[1], expected[4]).unwrap();

        let flat = flatten_ast(&graph, tu);
        assert_eq!(flat.len(), 5);
        assert_eq!(flat[0], tu);
        let unique: HashSet<_> = flat.iter().collect();
        assert_eq!(unique.len(), flat.len());
    }

    #[test]
    fn test_unique_roots_keeps_first_seen_order() {
        let roots = [
            RootNode(NodeId(4)),
            RootNode(NodeId(1)),
            RootNode(NodeId(4)),
            RootNode(NodeId(2)),
            RootNode(NodeId(1)),
        ];
        assert_eq!(
            unique_roots(&roots),
            vec![RootNode(NodeId(4)), RootNode(NodeId(1)), RootNode(NodeId(2))]
        );
    }

    #[test]
    fn test_flatten_roots_merges_without_duplicates() {
        let mut graph = CpgGraph::new();
        let (tu1, first) = small_unit(&mut graph);
        let (tu2, second) = small_unit(&mut graph);
        // A node shared by both units is emitted once.
        graph.add_ast_child(tu2, first[2]).unwrap();

        let flat = flatten_roots(&graph, &[RootNode(tu1), RootNode(tu2)]);
        assert_eq!(flat.len(), first.len() + second.len());
        assert_eq!(&flat[..5], first.as_slice());
    }

    #[test]
    fn test_unknown_root_is_skipped() {
        let graph = CpgGraph::new();
        assert!(flatten_ast(&graph, NodeId(0)).is_empty());
    }
}
