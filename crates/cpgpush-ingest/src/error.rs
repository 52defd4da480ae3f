//! Error types for the cpgpush-ingest crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Step of a load during which a database write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Purge,
    BeginTransaction,
    Save,
    Commit,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Purge => "purge",
            Self::BeginTransaction => "begin transaction",
            Self::Save => "save",
            Self::Commit => "commit",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Connect(#[from] cpgpush_graph::ConnectError),

    #[error("Write to graph database failed during {stage}: {source}")]
    Write {
        stage: WriteStage,
        #[source]
        source: cpgpush_graph::GraphError,
    },

    #[error("Invalid graph: {0}")]
    Model(#[from] cpgpush_core::CoreError),

    #[error("Invalid input {}: {reason}", .path.display())]
    Input { path: PathBuf, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub(crate) fn write(stage: WriteStage) -> impl FnOnce(cpgpush_graph::GraphError) -> Self {
        move |source| Self::Write { stage, source }
    }

    pub(crate) fn input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
