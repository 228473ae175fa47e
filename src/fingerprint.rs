// 🔐 Batch Fingerprint - deterministic digest for change detection
// Misma data, mismo hash: independiente del orden de entrada y del
// proceso que lo calcula. La huella decide si un reproceso trae cambios.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::ingest::SourceKind;
use crate::normalize::{normalize_plate, normalize_token};
use crate::reconciliation::ReconciledTransfer;

/// Bump only when the projection format changes; old fingerprints stop
/// comparing equal and every day reads as changed once.
pub const FINGERPRINT_VERSION: &str = "v1";

// ============================================================================
// BATCH
// ============================================================================

/// The part of a transfer that identifies it for hashing. Built from
/// the extracted tokens, not the registry matches, so editing the fleet
/// file never rewrites history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFact {
    pub vehicle: String,
    pub to_driver: String,
    pub from_driver: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
}

impl TransferFact {
    pub fn from_reconciled(transfer: &ReconciledTransfer) -> Self {
        TransferFact {
            vehicle: normalize_plate(&transfer.candidate.vehicle_token),
            to_driver: normalize_token(&transfer.candidate.to_driver_token),
            from_driver: transfer
                .candidate
                .from_driver_token
                .as_deref()
                .map(normalize_token),
            timestamp: transfer.candidate.timestamp,
        }
    }
}

/// Everything one processing run is about to record for one date.
///
/// transfers_count is declared separately from the list on purpose: the
/// fingerprint takes it as given, so a count/list mismatch upstream
/// shows up as a change instead of being silently papered over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingBatch {
    pub date: NaiveDate,
    pub transfers_count: usize,
    pub file_labels: Vec<String>,
    pub source_kind: SourceKind,
    pub transfers: Vec<TransferFact>,
}

impl ProcessingBatch {
    pub fn from_transfers(
        date: NaiveDate,
        transfers: &[ReconciledTransfer],
        file_labels: Vec<String>,
        source_kind: SourceKind,
    ) -> Self {
        let facts: Vec<TransferFact> = transfers.iter().map(TransferFact::from_reconciled).collect();

        ProcessingBatch {
            date,
            transfers_count: facts.len(),
            file_labels,
            source_kind,
            transfers: facts,
        }
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// "v1:<sha256-hex>:<byte-sum>" over the canonical projection.
///
/// Serialization failure is a hard error; no fallback digest is ever
/// produced, because a wrong fingerprint corrupts change detection
/// forever while a failed run can simply be repeated.
pub fn batch_fingerprint(batch: &ProcessingBatch) -> Result<String> {
    let projection = canonical_projection(batch)?;

    let mut hasher = Sha256::new();
    hasher.update(projection.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    Ok(format!(
        "{}:{}:{}",
        FINGERPRINT_VERSION,
        digest,
        byte_sum_checksum(&projection)
    ))
}

/// Canonical JSON: normalized fields, rows and labels sorted, keys in
/// fixed order. Two batches with the same content always project to
/// the same bytes, whatever order the transfers arrived in.
fn canonical_projection(batch: &ProcessingBatch) -> Result<String> {
    let mut rows: Vec<(String, String, Option<String>, Option<String>)> = batch
        .transfers
        .iter()
        .map(|fact| {
            (
                normalize_plate(&fact.vehicle),
                normalize_token(&fact.to_driver),
                fact.from_driver.as_deref().map(normalize_token),
                fact.timestamp
                    .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            )
        })
        .collect();
    rows.sort();

    let mut labels: Vec<String> = batch
        .file_labels
        .iter()
        .map(|label| normalize_token(label))
        .collect();
    labels.sort();

    let projection = json!({
        "date": batch.date.format("%Y-%m-%d").to_string(),
        "files": labels,
        "source": batch.source_kind.code(),
        "transfers": rows,
        "transfers_count": batch.transfers_count,
    });

    serde_json::to_string(&projection).context("Failed to serialize batch projection")
}

fn byte_sum_checksum(text: &str) -> String {
    let sum = text.bytes().fold(0u32, |acc, byte| acc.wrapping_add(byte as u32));
    format!("{:08x}", sum)
}

// ============================================================================
// TESTS
// ============================================================================
