//! cpgpush Graph — database sessions for code property graph ingestion.
//!
//! This crate owns every conversation with the graph database: acquiring a
//! session with bounded retries, purging, and committing save plans as bulk
//! writes. The Neo4j backend speaks Bolt through `neo4rs`; the in-memory
//! backend implements the same session contract for dry runs and tests.

pub mod client;
pub mod connect;
pub mod memory;
pub mod mutations;
pub mod session;

pub use client::{GraphConfig, GraphError, Neo4jConnector, Neo4jSession};
pub use connect::{connect, ConnectError, RetryPolicy};
pub use memory::{MemoryConnector, MemoryStore};
pub use session::{Connector, GraphSession, OpenError, SaveSummary};
