//! cpgpush-core: Graph model and save planning for code property graph ingestion.
//!
//! This crate provides the pieces of the ingestion pipeline that do not talk
//! to a database:
//! - The arena graph model (`CpgGraph`, `GraphNode`, `RootNode`)
//! - AST walking (root deduplication, pre-order flattening)
//! - Depth-bounded save planning (`SaveDepth`, `SavePlan`)
//! - Load options and core error types

pub mod config;
pub mod error;
pub mod plan;
pub mod types;
pub mod walk;

pub use config::LoadOptions;
pub use error::CoreError;
pub use plan::{PlannedNode, PlannedRelationship, SaveDepth, SavePlan};
pub use types::{CpgGraph, Edge, GraphNode, NodeId, Properties, PropertyValue, RootNode, TranslationResult};
