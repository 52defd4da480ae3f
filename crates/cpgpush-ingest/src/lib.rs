//! cpgpush-ingest: Loads code property graph exports into Neo4j.
//!
//! Reads JSON graph exports, acquires a database session with bounded
//! retries, and writes every translation unit's AST in a single transaction.

pub mod config;
pub mod error;
pub mod input;
pub mod loader;
pub mod pipeline;

pub use self::config::IngestConfig;
pub use error::{IngestError, Result, WriteStage};
pub use loader::{load, LoadReport};
pub use pipeline::ingest;
