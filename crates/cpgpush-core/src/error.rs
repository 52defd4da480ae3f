use thiserror::Error;

use crate::types::NodeId;

/// Errors raised while building or planning a code property graph.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown node handle: {0}")]
    UnknownNode(NodeId),

    #[error("Node {node} references missing node {missing}")]
    DanglingReference { node: NodeId, missing: NodeId },

    #[error("Node {node} has an edge without a relationship type")]
    EmptyRelationshipType { node: NodeId },

    #[error("Invalid save depth {0}: use -1 for unlimited or a non-negative hop count")]
    InvalidDepth(i64),
}
