//! Load options shared by the loader and its front ends.
//!
//! Loaded from (in priority order):
//! 1. CLI flags
//! 2. Environment variables (CPGPUSH__LOAD__ prefix)
//! 3. Config file (`[load]` section of cpgpush.toml)
//! 4. Defaults

use serde::{Deserialize, Serialize};

use crate::plan::SaveDepth;

/// Options for one graph load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadOptions {
    /// Relationship hops serialized per pushed node (-1 = unlimited).
    #[serde(default)]
    pub save_depth: SaveDepth,

    /// Delete all existing database content before loading.
    #[serde(default = "default_true")]
    pub purge_before_load: bool,

    /// Run the purge inside the write transaction instead of before it.
    #[serde(default)]
    pub purge_in_transaction: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            save_depth: SaveDepth::Unbounded,
            purge_before_load: true,
            purge_in_transaction: false,
        }
    }
}
