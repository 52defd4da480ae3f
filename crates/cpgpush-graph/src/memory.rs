//! In-memory graph backend.
//!
//! Mirrors the Neo4j session semantics closely enough to drive the whole
//! ingestion pipeline without a database: transactions are staged and only
//! applied on commit, nodes are merged on their per-run key, and every session
//! operation is appended to a journal. Used for dry runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use cpgpush_core::{NodeId, Properties, SavePlan};

use crate::client::GraphError;
use crate::session::{Connector, GraphSession, OpenError, SaveSummary};

/// A session operation as recorded in the store journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Purge { in_transaction: bool },
    Begin,
    Save { nodes: usize, relationships: usize },
    Commit,
    Rollback,
    Clear,
    Close,
}

#[derive(Debug, Clone)]
struct StoredNode {
    id: NodeId,
    labels: Vec<String>,
    properties: Properties,
}

#[derive(Debug, Clone)]
struct StoredRelationship {
    source: String,
    target: String,
    rel_type: String,
    properties: Properties,
}

#[derive(Debug, Default)]
struct StoreState {
    nodes: HashMap<String, StoredNode>,
    relationships: Vec<StoredRelationship>,
    journal: Vec<Operation>,
    login: Option<(String, String)>,
    fail_purge: Option<String>,
    fail_save: Option<String>,
    fail_commit: Option<String>,
}

/// Node and relationship content of a store, independent of run keys.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    /// `(node, labels, properties)` sorted by node.
    pub nodes: Vec<(NodeId, Vec<String>, Properties)>,
    /// `(source, type, target, properties)` sorted by endpoints and type.
    pub relationships: Vec<(NodeId, String, NodeId, Properties)>,
}

/// Shared in-memory database. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject sessions that do not log in with these credentials.
    pub fn require_login(self, user: &str, password: &str) -> Self {
        self.lock().login = Some((user.to_string(), password.to_string()));
        self
    }

    /// Make the next purge fail with `reason`.
    pub fn fail_next_purge(&self, reason: &str) {
        self.lock().fail_purge = Some(reason.to_string());
    }

    /// Make the next save fail with `reason`.
    pub fn fail_next_save(&self, reason: &str) {
        self.lock().fail_save = Some(reason.to_string());
    }

    /// Make the next commit fail with `reason`.
    pub fn fail_next_commit(&self, reason: &str) {
        self.lock().fail_commit = Some(reason.to_string());
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.lock().relationships.len()
    }

    pub fn journal(&self) -> Vec<Operation> {
        self.lock().journal.clone()
    }

    /// How often `op` appears in the journal.
    pub fn count(&self, op: &Operation) -> usize {
        self.lock().journal.iter().filter(|o| *o == op).count()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.lock();
        let mut nodes: Vec<_> = state
            .nodes
            .values()
            .map(|n| (n.id, n.labels.clone(), n.properties.clone()))
            .collect();
        nodes.sort_by_key(|(id, _, _)| *id);

        let mut relationships: Vec<_> = state
            .relationships
            .iter()
            .filter_map(|r| {
                let source = state.nodes.get(&r.source)?.id;
                let target = state.nodes.get(&r.target)?.id;
                Some((source, r.rel_type.clone(), target, r.properties.clone()))
            })
            .collect();
        relationships.sort_by(|a, b| (a.0, &a.1, a.2).cmp(&(b.0, &b.1, b.2)));

        GraphSnapshot {
            nodes,
            relationships,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: Operation) {
        self.lock().journal.push(op);
    }
}

/// Opens [`MemorySession`]s on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnector {
    store: MemoryStore,
    user: String,
    password: String,
    script: Mutex<VecDeque<Option<OpenError>>>,
    unreachable: bool,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            script: Mutex::new(VecDeque::new()),
            unreachable: false,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Credentials presented on every attempt.
    pub fn login(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// Fail every unscripted attempt as unreachable.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Outcomes for the first attempts: `Some(err)` fails that attempt,
    /// `None` lets it proceed normally.
    pub fn with_script(self, script: impl IntoIterator<Item = Option<OpenError>>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(script);
        self
    }

    /// Number of `open_session` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Session = MemorySession;

    fn address(&self) -> String {
        "memory".to_string()
    }

    async fn open_session(&self) -> Result<MemorySession, OpenError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(Some(err)) => return Err(err),
            Some(None) => {}
            None if self.unreachable => {
                return Err(OpenError::Transient("connection refused".to_string()))
            }
            None => {}
        }

        if let Some((user, password)) = &self.store.lock().login {
            if *user != self.user || *password != self.password {
                return Err(OpenError::Authentication(format!(
                    "invalid credentials for user {}",
                    self.user
                )));
            }
        }

        Ok(MemorySession {
            store: self.store.clone(),
            staged: None,
        })
    }
}

#[derive(Debug)]
enum StagedWrite {
    Purge,
    Save {
        nodes: Vec<(String, StoredNode)>,
        relationships: Vec<StoredRelationship>,
    },
}

/// A session on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    staged: Option<Vec<StagedWrite>>,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn purge_database(&mut self) -> Result<(), GraphError> {
        let in_transaction = self.staged.is_some();
        let mut state = self.store.lock();
        state.journal.push(Operation::Purge { in_transaction });
        if let Some(reason) = state.fail_purge.take() {
            return Err(GraphError::Rejected(reason));
        }
        match self.staged.as_mut() {
            Some(staged) => staged.push(StagedWrite::Purge),
            None => {
                state.nodes.clear();
                state.relationships.clear();
            }
        }
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<(), GraphError> {
        if self.staged.is_some() {
            return Err(GraphError::TransactionAlreadyOpen);
        }
        self.store.record(Operation::Begin);
        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn save(&mut self, plan: &SavePlan) -> Result<SaveSummary, GraphError> {
        let staged = self.staged.as_mut().ok_or(GraphError::NoTransaction)?;
        let summary = SaveSummary {
            nodes: plan.nodes.len(),
            relationships: plan.relationships.len(),
        };
        {
            let mut state = self.store.lock();
            state.journal.push(Operation::Save {
                nodes: summary.nodes,
                relationships: summary.relationships,
            });
            if let Some(reason) = state.fail_save.take() {
                return Err(GraphError::Rejected(reason));
            }
        }

        let nodes = plan
            .nodes
            .iter()
            .map(|n| {
                let stored = StoredNode {
                    id: n.id,
                    labels: n.labels.clone(),
                    properties: n.properties.clone(),
                };
                (plan.key(n.id), stored)
            })
            .collect();
        let relationships = plan
            .relationships
            .iter()
            .map(|r| StoredRelationship {
                source: plan.key(r.source),
                target: plan.key(r.target),
                rel_type: r.rel_type.clone(),
                properties: r.properties.clone(),
            })
            .collect();
        staged.push(StagedWrite::Save {
            nodes,
            relationships,
        });
        Ok(summary)
    }

    async fn commit(&mut self) -> Result<(), GraphError> {
        let staged = self.staged.take().ok_or(GraphError::NoTransaction)?;
        let mut state = self.store.lock();
        state.journal.push(Operation::Commit);
        if let Some(reason) = state.fail_commit.take() {
            return Err(GraphError::Rejected(reason));
        }
        for write in staged {
            match write {
                StagedWrite::Purge => {
                    state.nodes.clear();
                    state.relationships.clear();
                }
                StagedWrite::Save {
                    nodes,
                    relationships,
                } => {
                    for (key, node) in nodes {
                        let entry = state.nodes.entry(key).or_insert_with(|| StoredNode {
                            properties: Properties::new(),
                            ..node.clone()
                        });
                        entry.labels = node.labels;
                        entry.properties.extend(node.properties);
                    }
                    state.relationships.extend(relationships);
                }
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), GraphError> {
        self.staged.take().ok_or(GraphError::NoTransaction)?;
        self.store.record(Operation::Rollback);
        Ok(())
    }

    fn has_open_transaction(&self) -> bool {
        self.staged.is_some()
    }

    fn clear(&mut self) {
        self.staged = None;
        self.store.record(Operation::Clear);
    }

    async fn close(mut self) -> Result<(), GraphError> {
        self.staged = None;
        self.store.record(Operation::Close);
        Ok(())
    }
}
