// Custodia - vehicle custody transfers out of fleet chat transcripts
// Exposes every pipeline stage for the CLI and for tests.

pub mod alerts;
pub mod deduplication;
pub mod fingerprint;
pub mod ingest;
pub mod ledger;
pub mod normalize;
pub mod notify;
pub mod patterns;
pub mod pipeline;
pub mod reconciliation;
pub mod registry;
pub mod temporal;

pub use alerts::{AlertPolicy, AlertScheduler, TickOutcome};
pub use deduplication::{candidate_key, dedupe_candidates, CandidateKey, DedupReport};
pub use fingerprint::{batch_fingerprint, ProcessingBatch, TransferFact, FINGERPRINT_VERSION};
pub use ingest::{
    detect_source_kind, load_lines, load_tabular, load_transcript, RawLine, SourceKind,
};
pub use ledger::{
    alert_already_sent, check_processing, detect_changes, latest_record, record_processing,
    record_sent_alert, records_for_date, sent_alerts_for_date, setup_ledger, AlertKind,
    ChangeRecommendation, ChangeReport, DailyProcessingRecord, ProcessingStatus, SentAlertRecord,
};
pub use notify::{ConsoleNotifier, NotificationMessage, NotificationSender, RecordingSender};
pub use patterns::{default_rules, PatternExtractor, RoleMap, TransferCandidate, TransferRule};
pub use pipeline::{analyze_lines, commit_batch, BatchAnalysis, CommitOutcome, ProcessingContext};
pub use reconciliation::{
    MatchSuggestions, OverrideRole, ReconciledTransfer, ReconciliationEngine,
};
pub use registry::{
    write_starter_registry, CanonicalDriver, CanonicalVehicle, FileRegistry, RegistryProvider,
    RegistrySnapshot, StaticRegistry,
};
pub use temporal::TemporalExtractor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
