//! Graph loader: push a translation result through one write transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use cpgpush_core::walk::{flatten_roots, unique_roots};
use cpgpush_core::{LoadOptions, SavePlan, TranslationResult};
use cpgpush_graph::GraphSession;

use crate::error::{IngestError, Result, WriteStage};

/// Outcome of a committed load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub roots_received: usize,
    pub unique_roots: usize,
    pub nodes_flattened: usize,
    pub nodes_written: usize,
    pub relationships_written: usize,
    pub save_depth: i64,
    pub purged: bool,
    pub committed_at: DateTime<Utc>,
}

/// Load `input` into the database behind `session`.
///
/// Roots are deduplicated by identity, each unique root's AST is flattened,
/// and the combined node list is written as one bulk save in one transaction.
/// The graph is validated and planned before the database is touched, so an
/// invalid input never purges existing content. A failed save rolls the
/// transaction back; no error is retried here.
pub async fn load<S: GraphSession>(
    session: &mut S,
    input: &TranslationResult,
    options: &LoadOptions,
) -> Result<LoadReport> {
    input.graph.validate()?;

    let roots = unique_roots(&input.translation_units);
    if roots.len() != input.translation_units.len() {
        tracing::debug!(
            received = input.translation_units.len(),
            unique = roots.len(),
            "Dropped duplicate translation units"
        );
    }
    let nodes = flatten_roots(&input.graph, &roots);
    let plan = SavePlan::build(&input.graph, &nodes, options.save_depth)?;

    let purge = options.purge_before_load;
    if purge && !options.purge_in_transaction {
        session
            .purge_database()
            .await
            .map_err(IngestError::write(WriteStage::Purge))?;
    }

    session
        .begin_transaction()
        .await
        .map_err(IngestError::write(WriteStage::BeginTransaction))?;

    let saved = match write_in_transaction(session, &plan, purge && options.purge_in_transaction).await
    {
        Ok(summary) => summary,
        Err(err) => {
            if let Err(rollback_err) = session.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback after failed save also failed");
            }
            return Err(err);
        }
    };

    session
        .commit()
        .await
        .map_err(IngestError::write(WriteStage::Commit))?;
    session.clear();

    let report = LoadReport {
        run_id: plan.run_id,
        roots_received: input.translation_units.len(),
        unique_roots: roots.len(),
        nodes_flattened: nodes.len(),
        nodes_written: saved.nodes,
        relationships_written: saved.relationships,
        save_depth: options.save_depth.as_i64(),
        purged: purge,
        committed_at: Utc::now(),
    };
    tracing::info!(
        run_id = %report.run_id,
        unique_roots = report.unique_roots,
        nodes = report.nodes_written,
        relationships = report.relationships_written,
        depth = %options.save_depth,
        "Committed graph"
    );
    Ok(report)
}

async fn write_in_transaction<S: GraphSession>(
    session: &mut S,
    plan: &SavePlan,
    purge: bool,
) -> Result<cpgpush_graph::SaveSummary> {
    if purge {
        session
            .purge_database()
            .await
            .map_err(IngestError::write(WriteStage::Purge))?;
    }
    session
        .save(plan)
        .await
        .map_err(IngestError::write(WriteStage::Save))
}
