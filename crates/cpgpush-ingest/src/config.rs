//! Configuration for the cpgpush-ingest loader.
//!
//! Loaded from (lowest to highest priority): defaults, `cpgpush.toml`,
//! `CPGPUSH__` environment variables, then CLI flags applied by the binary.

use serde::Deserialize;

use cpgpush_core::LoadOptions;
use cpgpush_graph::{GraphConfig, RetryPolicy};

use crate::error::{IngestError, Result};

/// Top-level ingest configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub neo4j: GraphConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub load: LoadOptions,
}

impl IngestConfig {
    /// Read `<file_prefix>.{toml,json,..}` (optional) and `CPGPUSH__*` variables.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("CPGPUSH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        cfg.try_deserialize::<Self>()
            .map_err(|e| IngestError::Config(e.to_string()))
    }
}
