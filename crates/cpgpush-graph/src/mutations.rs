//! Bulk writes of a save plan.
//!
//! Nodes are written first, grouped by label set, then relationships grouped
//! by type. Each group is sent as `UNWIND $rows` batches inside the session's
//! open transaction. Node batches return the element id of every created node
//! under its plan key; relationship rows bind their endpoints by those ids, so
//! no lookup property is written and no index is needed.

use std::collections::{BTreeMap, HashMap};

use neo4rs::{query, BoltType};

use cpgpush_core::{Properties, PropertyValue, SavePlan};

use crate::client::{GraphError, Neo4jSession};
use crate::session::SaveSummary;

type Row = HashMap<String, BoltType>;

impl Neo4jSession {
    /// Write every node and relationship row of `plan` in the open transaction.
    pub(crate) async fn write_plan(&mut self, plan: &SavePlan) -> Result<SaveSummary, GraphError> {
        let Self {
            txn,
            statements,
            batch_size,
            ..
        } = self;
        let txn = txn.as_mut().ok_or(GraphError::NoTransaction)?;
        let batch_size = *batch_size;

        // ── Nodes ────────────────────────────────────────────────

        let mut element_ids: HashMap<String, String> = HashMap::with_capacity(plan.nodes.len());
        for (labels, rows) in &node_rows(plan) {
            let cypher = statements
                .entry(format!("node:{}", labels.join(":")))
                .or_insert_with(|| node_statement(labels))
                .clone();
            for chunk in rows.chunks(batch_size) {
                let q = query(&cypher).param("rows", chunk.to_vec());
                let mut stream = txn.execute(q).await?;
                while let Some(row) = stream.next(txn.handle()).await? {
                    let key: String = row.get("key").map_err(unexpected_result)?;
                    let eid: String = row.get("eid").map_err(unexpected_result)?;
                    element_ids.insert(key, eid);
                }
            }
            tracing::debug!(labels = %labels.join(":"), count = rows.len(), "Wrote node batch");
        }

        // ── Relationships ────────────────────────────────────────

        for (rel_type, rows) in &relationship_rows(plan, &element_ids)? {
            let cypher = statements
                .entry(format!("rel:{rel_type}"))
                .or_insert_with(|| relationship_statement(rel_type))
                .clone();
            for chunk in rows.chunks(batch_size) {
                let q = query(&cypher).param("rows", chunk.to_vec());
                txn.run(q).await?;
            }
            tracing::debug!(rel_type, count = rows.len(), "Wrote relationship batch");
        }

        Ok(SaveSummary {
            nodes: plan.nodes.len(),
            relationships: plan.relationships.len(),
        })
    }
}

fn unexpected_result(err: impl std::fmt::Display) -> GraphError {
    GraphError::Rejected(format!("unexpected node write result: {err}"))
}

// ── Rows ─────────────────────────────────────────────────────────

fn node_rows(plan: &SavePlan) -> BTreeMap<&[String], Vec<Row>> {
    let mut groups: BTreeMap<&[String], Vec<Row>> = BTreeMap::new();
    for node in &plan.nodes {
        let mut row = Row::new();
        row.insert("key".to_string(), plan.key(node.id).into());
        row.insert("props".to_string(), properties_to_bolt(&node.properties));
        groups.entry(node.labels.as_slice()).or_default().push(row);
    }
    groups
}

/// Relationship rows keyed by type, endpoints resolved to element ids.
fn relationship_rows<'p>(
    plan: &'p SavePlan,
    element_ids: &HashMap<String, String>,
) -> Result<BTreeMap<&'p str, Vec<Row>>, GraphError> {
    let resolve = |id| {
        let key = plan.key(id);
        element_ids
            .get(&key)
            .cloned()
            .ok_or_else(|| GraphError::Rejected(format!("node {key} was not written")))
    };

    let mut groups: BTreeMap<&str, Vec<Row>> = BTreeMap::new();
    for rel in &plan.relationships {
        let mut row = Row::new();
        row.insert("source".to_string(), resolve(rel.source)?.into());
        row.insert("target".to_string(), resolve(rel.target)?.into());
        row.insert("props".to_string(), properties_to_bolt(&rel.properties));
        groups.entry(rel.rel_type.as_str()).or_default().push(row);
    }
    Ok(groups)
}

// ── Cypher ───────────────────────────────────────────────────────

fn node_statement(labels: &[String]) -> String {
    let labels: String = labels.iter().map(|l| format!(":{}", quote(l))).collect();
    format!(
        "UNWIND $rows AS row
         CREATE (n{labels})
         SET n = row.props
         RETURN row.key AS key, elementId(n) AS eid"
    )
}

fn relationship_statement(rel_type: &str) -> String {
    let rel = quote(rel_type);
    format!(
        "UNWIND $rows AS row
         MATCH (a) WHERE elementId(a) = row.source
         MATCH (b) WHERE elementId(b) = row.target
         CREATE (a)-[r:{rel}]->(b)
         SET r += row.props"
    )
}

/// Backtick-quote a label or relationship type.
fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// ── Helpers ──────────────────────────────────────────────────────

fn properties_to_bolt(props: &Properties) -> BoltType {
    let map: HashMap<String, BoltType> = props
        .iter()
        .map(|(k, v)| (k.clone(), value_to_bolt(v)))
        .collect();
    map.into()
}

fn value_to_bolt(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Bool(b) => (*b).into(),
        PropertyValue::Int(i) => (*i).into(),
        PropertyValue::Float(f) => (*f).into(),
        PropertyValue::String(s) => s.clone().into(),
        PropertyValue::List(items) => items.iter().map(value_to_bolt).collect::<Vec<BoltType>>().into(),
    }
}
