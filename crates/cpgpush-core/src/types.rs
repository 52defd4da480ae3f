//! Core graph types for code property graph ingestion.
//!
//! The analyzer output is held in an arena ([`CpgGraph`]) and addressed by
//! dense [`NodeId`] handles. Handles are the identity of a node: two handles
//! refer to the same node iff they are equal, regardless of node content.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Relationship type used for AST parent → child edges.
pub const AST_RELATIONSHIP: &str = "AST";

// ── Handles ───────────────────────────────────────────────────────

/// Dense handle of a node inside a [`CpgGraph`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One translation unit handed over by the analyzer.
///
/// Equality and hashing go through the handle only, so the same translation
/// unit presented twice collapses to one root while two structurally equal
/// units stay distinct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RootNode(pub NodeId);

impl RootNode {
    pub fn node_id(self) -> NodeId {
        self.0
    }
}

// ── Payload ───────────────────────────────────────────────────────

/// A property value that Neo4j can store on a node or relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Convert an arbitrary JSON value into a storable property.
    ///
    /// `null` yields `None` (Neo4j does not store nulls). Objects and
    /// non-homogeneous, nested or null-holding arrays are kept as their JSON text.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::String(s)),
            Value::Array(items) => {
                let text = Value::Array(items.clone()).to_string();
                if items.iter().any(Value::is_null) {
                    return Some(Self::String(text));
                }
                let converted: Vec<PropertyValue> = items
                    .into_iter()
                    .filter_map(Self::from_json)
                    .collect();
                if is_homogeneous_scalar_list(&converted) {
                    Some(Self::List(converted))
                } else {
                    Some(Self::String(text))
                }
            }
            obj @ Value::Object(_) => Some(Self::String(obj.to_string())),
        }
    }

    fn kind(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Float(_) => 2,
            Self::String(_) => 3,
            Self::List(_) => 4,
        }
    }
}

fn is_homogeneous_scalar_list(items: &[PropertyValue]) -> bool {
    match items.first() {
        None => true,
        Some(first) => {
            let kind = first.kind();
            kind != 4 && items.iter().all(|v| v.kind() == kind)
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

// ── Nodes and edges ───────────────────────────────────────────────

/// An auxiliary (non-AST) outgoing relationship, e.g. EOG, DFG, REFERS_TO.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub kind: String,
    pub target: NodeId,
    #[serde(default)]
    pub properties: Properties,
}

/// A node of the analyzed program graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub ast_children: Vec<NodeId>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphNode {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Arena owning every node produced by the analyzer.
#[derive(Debug, Clone, Default)]
pub struct CpgGraph {
    nodes: Vec<GraphNode>,
}

impl CpgGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its handle.
    ///
    /// Child and edge handles already present on `node` must refer to nodes
    /// of this graph once construction is finished; use [`CpgGraph::validate`]
    /// to check.
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append `child` to the AST children of `parent`.
    pub fn add_ast_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        if !self.contains(child) {
            return Err(CoreError::UnknownNode(child));
        }
        let node = self
            .nodes
            .get_mut(parent.index())
            .ok_or(CoreError::UnknownNode(parent))?;
        node.ast_children.push(child);
        Ok(())
    }

    /// Add an auxiliary relationship `source -[kind]-> target`.
    pub fn add_edge(
        &mut self,
        source: NodeId,
        kind: &str,
        target: NodeId,
        properties: Properties,
    ) -> Result<(), CoreError> {
        if !self.contains(target) {
            return Err(CoreError::UnknownNode(target));
        }
        let node = self
            .nodes
            .get_mut(source.index())
            .ok_or(CoreError::UnknownNode(source))?;
        node.edges.push(Edge {
            kind: kind.to_string(),
            target,
            properties,
        });
        Ok(())
    }

    /// Check that every child and edge target refers to a node of this graph
    /// and that every edge has a relationship type.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let source = NodeId(index as u32);
            if node.edges.iter().any(|e| e.kind.is_empty()) {
                return Err(CoreError::EmptyRelationshipType { node: source });
            }
            let targets = node
                .ast_children
                .iter()
                .copied()
                .chain(node.edges.iter().map(|e| e.target));
            for target in targets {
                if !self.contains(target) {
                    return Err(CoreError::DanglingReference {
                        node: source,
                        missing: target,
                    });
                }
            }
        }
        Ok(())
    }

    /// Iterate over `(relationship type, target, properties)` for every
    /// outgoing relationship of `id`: AST children first, then edges.
    pub fn relationships(&self, id: NodeId) -> impl Iterator<Item = Relationship<'_>> {
        let node = self.node(id);
        let ast = node
            .into_iter()
            .flat_map(|n| n.ast_children.iter().enumerate())
            .map(|(index, &child)| Relationship {
                rel_type: AST_RELATIONSHIP,
                target: child,
                ast_index: Some(index),
                properties: None,
            });
        let edges = node
            .into_iter()
            .flat_map(|n| n.edges.iter())
            .map(|e| Relationship {
                rel_type: e.kind.as_str(),
                target: e.target,
                ast_index: None,
                properties: Some(&e.properties),
            });
        ast.chain(edges)
    }
}

/// Borrowed view of one outgoing relationship.
#[derive(Debug, Clone, Copy)]
pub struct Relationship<'a> {
    pub rel_type: &'a str,
    pub target: NodeId,
    pub ast_index: Option<usize>,
    pub properties: Option<&'a Properties>,
}

/// Output of one analysis run: the graph plus its translation units.
///
/// `translation_units` may name the same root more than once.
#[derive(Debug, Clone, Default)]
pub struct TranslationResult {
    pub graph: CpgGraph,
    pub translation_units: Vec<RootNode>,
}

impl TranslationResult {
    pub fn new(graph: CpgGraph, translation_units: Vec<RootNode>) -> Self {
        Self {
            graph,
            translation_units,
        }
    }
}
