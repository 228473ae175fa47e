// 🧭 Processing Pipeline - extract, dedupe, reconcile, commit
// Los colaboradores entran por el contexto; aquí no hay singletons.

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::deduplication::{dedupe_candidates, DedupReport};
use crate::fingerprint::ProcessingBatch;
use crate::ingest::RawLine;
use crate::ledger::{
    detect_changes, record_processing, ChangeRecommendation, ChangeReport, DailyProcessingRecord,
};
use crate::patterns::PatternExtractor;
use crate::reconciliation::{ReconciledTransfer, ReconciliationEngine};
use crate::registry::{RegistryProvider, RegistrySnapshot};

// ============================================================================
// CONTEXT
// ============================================================================

pub struct ProcessingContext<'a> {
    pub extractor: PatternExtractor,
    pub reconciler: ReconciliationEngine,
    pub registry: &'a dyn RegistryProvider,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(registry: &'a dyn RegistryProvider) -> Self {
        ProcessingContext {
            extractor: PatternExtractor::new(),
            reconciler: ReconciliationEngine::new(),
            registry,
        }
    }
}

// ============================================================================
// ANALYSIS
// ============================================================================

#[derive(Debug)]
pub struct BatchAnalysis {
    pub transfers: Vec<ReconciledTransfer>,
    pub dedup: DedupReport,
    /// The snapshot everything above was resolved against.
    pub registry: RegistrySnapshot,
}

impl BatchAnalysis {
    pub fn valid_count(&self) -> usize {
        self.transfers.iter().filter(|t| t.is_valid).count()
    }
}

/// Extract → dedupe → reconcile. Pure with respect to the ledger:
/// no database is touched.
pub fn analyze_lines(ctx: &ProcessingContext, lines: &[RawLine]) -> Result<BatchAnalysis> {
    let registry = ctx
        .registry
        .snapshot()
        .context("Failed to load fleet registry")?;

    let candidates = ctx.extractor.extract(lines);
    let (unique, dedup) = dedupe_candidates(candidates);
    let transfers = ctx.reconciler.reconcile_all(unique, &registry);

    Ok(BatchAnalysis {
        transfers,
        dedup,
        registry,
    })
}

// ============================================================================
// COMMIT
// ============================================================================

#[derive(Debug)]
pub enum CommitOutcome {
    Recorded {
        record: DailyProcessingRecord,
        report: ChangeReport,
    },
    SkippedUnchanged {
        report: ChangeReport,
    },
}

/// Change-gate plus append. force bypasses the gate, never the append.
pub fn commit_batch(
    conn: &Connection,
    batch: &ProcessingBatch,
    force: bool,
) -> Result<CommitOutcome> {
    let report = detect_changes(conn, batch)?;

    if report.recommendation == ChangeRecommendation::SkipUnchanged && !force {
        return Ok(CommitOutcome::SkippedUnchanged { report });
    }

    let record = record_processing(conn, batch)?;
    Ok(CommitOutcome::Recorded { record, report })
}

// ============================================================================
// TESTS
// ============================================================================
