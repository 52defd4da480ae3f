//! Session abstraction over a graph database backend.
//!
//! A [`Connector`] opens sessions; a [`GraphSession`] is a live, exclusively
//! owned handle to one database connection and its transaction state. The
//! caller that acquired a session must release it with [`GraphSession::clear`]
//! and [`GraphSession::close`] on every exit path.

use async_trait::async_trait;

use cpgpush_core::SavePlan;

use crate::client::GraphError;

/// Why a single session-open attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    /// Database unreachable or not yet accepting connections.
    #[error("database unreachable: {0}")]
    Transient(String),

    /// Credentials were rejected.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// The connection settings themselves are unusable.
    #[error("invalid connection settings: {0}")]
    InvalidConfig(String),
}

/// Row counts written by one bulk save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub nodes: usize,
    pub relationships: usize,
}

/// Opens sessions against one configured endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: GraphSession;

    /// Endpoint address for diagnostics, e.g. `localhost:7687`.
    fn address(&self) -> String;

    /// Make one attempt at opening a verified session.
    async fn open_session(&self) -> Result<Self::Session, OpenError>;
}

/// A live session with at most one open transaction.
#[async_trait]
pub trait GraphSession: Send {
    /// Delete every node and relationship. Runs inside the open transaction
    /// if there is one, otherwise as its own auto-committed statement.
    async fn purge_database(&mut self) -> Result<(), GraphError>;

    async fn begin_transaction(&mut self) -> Result<(), GraphError>;

    /// Write all rows of `plan` inside the open transaction.
    async fn save(&mut self, plan: &SavePlan) -> Result<SaveSummary, GraphError>;

    async fn commit(&mut self) -> Result<(), GraphError>;

    async fn rollback(&mut self) -> Result<(), GraphError>;

    fn has_open_transaction(&self) -> bool;

    /// Drop session-local caches and any transaction left open.
    fn clear(&mut self);

    /// Close the session and its underlying connection.
    async fn close(self) -> Result<(), GraphError>;
}
