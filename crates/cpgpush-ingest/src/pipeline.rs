//! Ingestion run: connect, load, release.

use cpgpush_core::{LoadOptions, TranslationResult};
use cpgpush_graph::{connect, Connector, GraphSession, RetryPolicy};

use crate::error::Result;
use crate::loader::{load, LoadReport};

/// Push `input` through a session acquired from `connector`.
///
/// Once a session is acquired it is always cleared and closed, whether the
/// load succeeds or fails. A failure while releasing is logged and never
/// replaces the load outcome.
pub async fn ingest<C: Connector>(
    connector: &C,
    retry: &RetryPolicy,
    input: &TranslationResult,
    options: &LoadOptions,
) -> Result<LoadReport> {
    let mut session = connect(connector, retry).await?;

    let outcome = load(&mut session, input, options).await;
    release(session).await;

    if let Err(err) = &outcome {
        tracing::error!(error = %err, "Graph load failed");
    }
    outcome
}

async fn release<S: GraphSession>(mut session: S) {
    session.clear();
    if let Err(err) = session.close().await {
        tracing::warn!(error = %err, "Failed to close graph session");
    }
}
