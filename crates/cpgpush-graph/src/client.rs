//! Neo4j connection management and the Bolt-backed session.

use std::collections::HashMap;

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Txn};
use serde::Deserialize;

use cpgpush_core::SavePlan;

use crate::session::{Connector, GraphSession, OpenError, SaveSummary};

/// Deletes every node together with its relationships.
pub(crate) const PURGE_CYPHER: &str = "MATCH (n) DETACH DELETE n";

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("No transaction is open on this session")]
    NoTransaction,

    #[error("A transaction is already open on this session")]
    TransactionAlreadyOpen,

    #[error("Write rejected by the database: {0}")]
    Rejected(String),
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Target database; the server default when unset.
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Rows per `UNWIND` statement during bulk saves.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Run `RETURN 1` after connecting so failures surface at connect time.
    #[serde(default = "default_true")]
    pub verify_connection: bool,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "neo4j".to_string()
}

fn default_fetch_size() -> usize {
    256
}

fn default_batch_size() -> usize {
    500
}

fn default_true() -> bool {
    true
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            database: None,
            fetch_size: default_fetch_size(),
            batch_size: default_batch_size(),
            verify_connection: true,
        }
    }
}

impl GraphConfig {
    /// Host and port of the endpoint, without scheme or path.
    pub fn address(&self) -> String {
        let rest = self
            .uri
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.uri);
        let host = rest.split(['/', '?']).next().unwrap_or(rest);
        host.rsplit('@').next().unwrap_or(host).to_string()
    }
}

/// Opens Bolt sessions against a single Neo4j endpoint.
#[derive(Debug, Clone)]
pub struct Neo4jConnector {
    config: GraphConfig,
}

impl Neo4jConnector {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for Neo4jConnector {
    type Session = Neo4jSession;

    fn address(&self) -> String {
        self.config.address()
    }

    async fn open_session(&self) -> Result<Neo4jSession, OpenError> {
        let config = &self.config;
        let mut builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(1)
            .fetch_size(config.fetch_size);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo_config = builder
            .build()
            .map_err(|e| OpenError::InvalidConfig(e.to_string()))?;

        // The pool is lazy; nothing is dialled until the first statement.
        let graph = Graph::connect(neo_config).await.map_err(classify_error)?;

        if config.verify_connection {
            graph
                .run(query("RETURN 1"))
                .await
                .map_err(classify_error)?;
        }

        tracing::debug!(uri = %config.uri, "Opened Neo4j session");
        Ok(Neo4jSession {
            graph,
            txn: None,
            batch_size: config.batch_size.max(1),
            statements: HashMap::new(),
        })
    }
}

/// Sort a driver error into the retry classes of the connection manager.
pub(crate) fn classify_error(err: neo4rs::Error) -> OpenError {
    match err {
        neo4rs::Error::AuthenticationError(msg) => OpenError::Authentication(msg),
        neo4rs::Error::UrlParseError(e) => OpenError::InvalidConfig(e.to_string()),
        other => {
            let msg = other.to_string();
            if is_security_failure(&msg) {
                OpenError::Authentication(msg)
            } else {
                OpenError::Transient(msg)
            }
        }
    }
}

fn is_security_failure(msg: &str) -> bool {
    msg.contains("Neo.ClientError.Security.Unauthorized")
        || msg.contains("Neo.ClientError.Security.AuthenticationRateLimit")
        || msg.contains("Neo.ClientError.Security.CredentialsExpired")
}

/// A Bolt session holding at most one open transaction.
///
/// The session caches generated `UNWIND` statements per label set and
/// relationship type; [`GraphSession::clear`] drops that cache.
pub struct Neo4jSession {
    pub(crate) graph: Graph,
    pub(crate) txn: Option<Txn>,
    pub(crate) batch_size: usize,
    pub(crate) statements: HashMap<String, String>,
}

impl Neo4jSession {
    /// Execute a read query and collect all rows, outside any transaction.
    pub async fn query_rows(&self, q: neo4rs::Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn purge_database(&mut self) -> Result<(), GraphError> {
        match self.txn.as_mut() {
            Some(txn) => txn.run(query(PURGE_CYPHER)).await?,
            None => self.graph.run(query(PURGE_CYPHER)).await?,
        }
        tracing::info!(in_transaction = self.txn.is_some(), "Purged database");
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<(), GraphError> {
        if self.txn.is_some() {
            return Err(GraphError::TransactionAlreadyOpen);
        }
        self.txn = Some(self.graph.start_txn().await?);
        Ok(())
    }

    async fn save(&mut self, plan: &SavePlan) -> Result<SaveSummary, GraphError> {
        self.write_plan(plan).await
    }

    async fn commit(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoTransaction)?;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoTransaction)?;
        txn.rollback().await?;
        Ok(())
    }

    fn has_open_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn clear(&mut self) {
        if self.txn.take().is_some() {
            tracing::warn!("Discarding uncommitted transaction on session clear");
        }
        self.statements.clear();
    }

    async fn close(mut self) -> Result<(), GraphError> {
        self.clear();
        drop(self.graph);
        tracing::debug!("Closed Neo4j session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.password, "neo4j");
        assert_eq!(config.batch_size, 500);
        assert!(config.verify_connection);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_address_strips_scheme_and_credentials() {
        let mut config = GraphConfig::default();
        assert_eq!(config.address(), "localhost:7687");

        config.uri = "neo4j+s://user@db.example.com:7687/neo4j?policy=x".to_string();
        assert_eq!(config.address(), "db.example.com:7687");

        config.uri = "localhost:7687".to_string();
        assert_eq!(config.address(), "localhost:7687");
    }

    #[test]
    fn test_classify_authentication_failures() {
        let err = classify_error(neo4rs::Error::AuthenticationError("bad creds".to_string()));
        assert_eq!(err, OpenError::Authentication("bad creds".to_string()));
    }

    #[test]
    fn test_classify_io_failures_as_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify_error(neo4rs::Error::IOError { detail: io });
        assert!(matches!(err, OpenError::Transient(_)));
    }

    #[test]
    fn test_security_codes_are_detected() {
        assert!(is_security_failure(
            "Neo.ClientError.Security.Unauthorized: The client is unauthorized"
        ));
        assert!(!is_security_failure("Connection refused (os error 111)"));
    }
}
