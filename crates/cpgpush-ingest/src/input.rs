//! Input handling: path validation and JSON graph exports.
//!
//! Each export is one analyzer run:
//!
//! ```json
//! {
//!   "translation_units": ["tu-1", "tu-1"],
//!   "nodes": [
//!     {"id": "tu-1", "labels": ["TranslationUnitDeclaration"],
//!      "properties": {"name": "a.c"}, "ast_children": ["f-1"],
//!      "edges": [{"kind": "EOG", "target": "f-1"}]},
//!     {"id": "f-1", "labels": ["FunctionDeclaration"]}
//!   ]
//! }
//! ```
//!
//! Node ids are strings or integers scoped to their document. Several
//! documents are merged into one [`TranslationResult`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use cpgpush_core::{CpgGraph, Edge, GraphNode, NodeId, Properties, PropertyValue, RootNode, TranslationResult};

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum DocId {
    Int(i64),
    Str(String),
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphDocument {
    #[serde(default)]
    translation_units: Vec<DocId>,
    nodes: Vec<NodeRecord>,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    id: DocId,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    ast_children: Vec<DocId>,
    #[serde(default)]
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    kind: String,
    target: DocId,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

/// Validate the given paths and expand directories into their `*.json` files.
///
/// Every path must exist and must not be hidden. Directory contents are
/// taken non-recursively, hidden files skipped, in file-name order.
pub fn resolve_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() || is_hidden(path) {
            return Err(IngestError::input(path, "please use a correct path"));
        }
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && !is_hidden(p))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();
            if entries.is_empty() {
                tracing::warn!(dir = %path.display(), "No JSON graph exports in directory");
            }
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    if files.is_empty() {
        return Err(IngestError::input(
            paths.first().cloned().unwrap_or_default(),
            "no graph exports to load",
        ));
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n != "." && n != "..")
}

/// Read and merge the graph exports at `files`.
pub fn read_translation_result(files: &[PathBuf]) -> Result<TranslationResult> {
    let mut result = TranslationResult::default();
    for file in files {
        let text = std::fs::read_to_string(file)?;
        let doc: GraphDocument = serde_json::from_str(&text)
            .map_err(|e| IngestError::input(file, format!("malformed graph export: {e}")))?;
        let before = result.graph.len();
        append_document(&mut result, doc).map_err(|reason| IngestError::input(file, reason))?;
        tracing::info!(
            file = %file.display(),
            nodes = result.graph.len() - before,
            "Read graph export"
        );
    }
    Ok(result)
}

/// Parse a single export from a string.
pub fn parse_translation_result(text: &str) -> std::result::Result<TranslationResult, String> {
    let doc: GraphDocument = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let mut result = TranslationResult::default();
    append_document(&mut result, doc)?;
    Ok(result)
}

fn append_document(result: &mut TranslationResult, doc: GraphDocument) -> std::result::Result<(), String> {
    let graph: &mut CpgGraph = &mut result.graph;
    let mut ids: HashMap<DocId, NodeId> = HashMap::with_capacity(doc.nodes.len());
    let mut links = Vec::with_capacity(doc.nodes.len());

    for record in doc.nodes {
        let node = GraphNode {
            labels: record.labels,
            properties: convert_properties(record.properties),
            ..Default::default()
        };
        let id = graph.add_node(node);
        if ids.insert(record.id.clone(), id).is_some() {
            return Err(format!("duplicate node id {}", record.id));
        }
        links.push((record.id, id, record.ast_children, record.edges));
    }

    let resolve = |doc_id: &DocId| {
        ids.get(doc_id)
            .copied()
            .ok_or_else(|| format!("unknown node id {doc_id}"))
    };

    for (doc_id, id, children, edges) in links {
        let children = children.iter().map(resolve).collect::<std::result::Result<Vec<_>, _>>()?;
        let edges = edges
            .into_iter()
            .map(|e| {
                if e.kind.trim().is_empty() {
                    return Err(format!("edge of node {doc_id} has an empty kind"));
                }
                Ok(Edge {
                    target: resolve(&e.target)?,
                    kind: e.kind,
                    properties: convert_properties(e.properties),
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;
        if let Some(node) = graph.node_mut(id) {
            node.ast_children = children;
            node.edges = edges;
        }
    }

    for tu in &doc.translation_units {
        result.translation_units.push(RootNode(resolve(tu)?));
    }
    Ok(())
}

fn convert_properties(raw: serde_json::Map<String, serde_json::Value>) -> Properties {
    raw.into_iter()
        .filter_map(|(k, v)| PropertyValue::from_json(v).map(|v| (k, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EXPORT: &str = r#"{
        "translation_units": ["tu", "tu", 7],
        "nodes": [
            {"id": "tu", "labels": ["TranslationUnitDeclaration"],
             "properties": {"name": "a.c", "comment": null, "location": {"line": 1}},
             "ast_children": ["main"]},
            {"id": "main", "labels": ["FunctionDeclaration"],
             "edges": [{"kind": "INVOKES", "target": 7, "properties": {"dynamic": false}}]},
            {"id": 7, "labels": ["TranslationUnitDeclaration"]}
        ]
    }"#;

    #[test]
    fn test_parse_export() {
        let result = parse_translation_result(EXPORT).unwrap();
        assert_eq!(result.graph.len(), 3);
        assert_eq!(
            result.translation_units,
            vec![RootNode(NodeId(0)), RootNode(NodeId(0)), RootNode(NodeId(2))]
        );

        let tu = result.graph.node(NodeId(0)).unwrap();
        assert_eq!(tu.ast_children, vec![NodeId(1)]);
        assert_eq!(tu.properties.get("name"), Some(&PropertyValue::from("a.c")));
        assert!(!tu.properties.contains_key("comment"));
        assert_eq!(
            tu.properties.get("location"),
            Some(&PropertyValue::from("{\"line\":1}"))
        );

        let main = result.graph.node(NodeId(1)).unwrap();
        assert_eq!(main.edges[0].target, NodeId(2));
        assert_eq!(main.edges[0].properties.get("dynamic"), Some(&PropertyValue::Bool(false)));
    }

    #[test]
    fn test_unknown_reference_is_rejected() {
        let err = parse_translation_result(
            r#"{"translation_units": ["a"], "nodes": [{"id": "a", "ast_children": ["b"]}]}"#,
        )
        .unwrap_err();
        assert!(err.contains("unknown node id \"b\""), "{err}");
    }

    #[test]
    fn test_empty_edge_kind_is_rejected() {
        let err = parse_translation_result(
            r#"{"nodes": [{"id": "a", "edges": [{"kind": "", "target": "a"}]}]}"#,
        )
        .unwrap_err();
        assert!(err.contains("edge of node \"a\" has an empty kind"), "{err}");
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let err = parse_translation_result(r#"{"nodes": [{"id": 1}, {"id": 1}]}"#).unwrap_err();
        assert!(err.contains("duplicate node id 1"), "{err}");
    }

    #[test]
    fn test_documents_are_merged_with_scoped_ids() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        fs::write(&first, r#"{"translation_units": [1], "nodes": [{"id": 1, "labels": ["TranslationUnitDeclaration"]}]}"#).unwrap();
        fs::write(&second, r#"{"translation_units": [1], "nodes": [{"id": 1, "labels": ["TranslationUnitDeclaration"]}]}"#).unwrap();

        let result = read_translation_result(&[first, second]).unwrap();
        assert_eq!(result.graph.len(), 2);
        assert_eq!(
            result.translation_units,
            vec![RootNode(NodeId(0)), RootNode(NodeId(1))]
        );
    }

    #[test]
    fn test_resolve_inputs_expands_directories() {
        let dir = tempfile::Builder::new().prefix("cpgpush").tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join(".hidden.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = resolve_inputs(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_resolve_inputs_rejects_missing_and_hidden_paths() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join(".cpg.json");
        fs::write(&hidden, "{}").unwrap();

        assert!(matches!(
            resolve_inputs(&[dir.path().join("missing.json")]),
            Err(IngestError::Input { .. })
        ));
        assert!(matches!(resolve_inputs(&[hidden]), Err(IngestError::Input { .. })));
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        fs::write(&file, "{not json").unwrap();

        let err = read_translation_result(&[file]).unwrap_err();
        assert!(err.to_string().contains("broken.json"), "{err}");
    }
}
