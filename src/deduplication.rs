// 🔁 Deduplication - collapse candidates describing the same handoff
// First seen wins; survivor order mirrors input order.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::normalize::{normalize_plate, normalize_token};
use crate::patterns::TransferCandidate;

/// Identity of a handoff: same vehicle, same receiving driver, same
/// minute. A missing timestamp groups only with other missing ones.
pub type CandidateKey = (String, String, Option<NaiveDateTime>);

pub fn candidate_key(candidate: &TransferCandidate) -> CandidateKey {
    (
        normalize_plate(&candidate.vehicle_token),
        normalize_token(&candidate.to_driver_token),
        candidate.timestamp,
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupReport {
    pub kept: usize,
    pub dropped: usize,
}

/// Drop every candidate whose key was already seen. Rule order inside a
/// line therefore decides which pattern survives an overlap.
pub fn dedupe_candidates(
    candidates: Vec<TransferCandidate>,
) -> (Vec<TransferCandidate>, DedupReport) {
    let mut seen: HashSet<CandidateKey> = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0;

    for candidate in candidates {
        if seen.insert(candidate_key(&candidate)) {
            kept.push(candidate);
        } else {
            dropped += 1;
        }
    }

    let report = DedupReport {
        kept: kept.len(),
        dropped,
    };

    (kept, report)
}

// ============================================================================
// TESTS
// ============================================================================
