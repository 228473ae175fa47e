// 📒 Daily Processing Ledger - append-only record of processed days
// Nunca UPDATE, nunca DELETE: cada procesamiento agrega un registro y el
// más reciente por fecha es el autoritativo. El historial completo queda
// para auditoría.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::fingerprint::{batch_fingerprint, ProcessingBatch};
use crate::ingest::SourceKind;
use crate::normalize::normalize_token;

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProcessingRecord {
    pub record_id: String,
    pub date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
    pub transfers_processed: usize,
    pub file_labels: Vec<String>,
    pub fingerprint: String,
    pub source_kind: SourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    DailyProcessing,
}

impl AlertKind {
    /// Stable code for persistence.
    pub fn code(&self) -> &str {
        match self {
            AlertKind::DailyProcessing => "daily_processing",
        }
    }

    pub fn from_code(code: &str) -> Option<AlertKind> {
        match code {
            "daily_processing" => Some(AlertKind::DailyProcessing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentAlertRecord {
    pub date: NaiveDate,
    pub alert_kind: AlertKind,
    pub sent_at: DateTime<Utc>,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_ledger(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable WAL mode")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_processing (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            transfers_processed INTEGER NOT NULL,
            file_labels TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            source_kind TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sent_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            alert_kind TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            UNIQUE(date, alert_kind)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_daily_processing_date ON daily_processing(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sent_alerts_date ON sent_alerts(date)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PROCESSING RECORDS
// ============================================================================

/// Append one processing record. The fingerprint is computed first: if
/// it fails, nothing is written.
pub fn record_processing(
    conn: &Connection,
    batch: &ProcessingBatch,
) -> Result<DailyProcessingRecord> {
    let fingerprint = batch_fingerprint(batch)?;

    let record = DailyProcessingRecord {
        record_id: uuid::Uuid::new_v4().to_string(),
        date: batch.date,
        recorded_at: Utc::now(),
        transfers_processed: batch.transfers_count,
        file_labels: batch.file_labels.clone(),
        fingerprint,
        source_kind: batch.source_kind,
    };

    let labels_json =
        serde_json::to_string(&record.file_labels).context("Failed to serialize file labels")?;

    conn.execute(
        "INSERT INTO daily_processing
         (record_id, date, recorded_at, transfers_processed, file_labels, fingerprint, source_kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.record_id,
            record.date.format("%Y-%m-%d").to_string(),
            record.recorded_at.to_rfc3339(),
            record.transfers_processed as i64,
            labels_json,
            record.fingerprint,
            record.source_kind.code(),
        ],
    )
    .context("Failed to append daily processing record")?;

    Ok(record)
}

/// Full history for a date, most recent first.
pub fn records_for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<DailyProcessingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT record_id, date, recorded_at, transfers_processed, file_labels, fingerprint, source_kind
         FROM daily_processing
         WHERE date = ?1
         ORDER BY recorded_at DESC, id DESC",
    )?;

    let records = stmt
        .query_map(params![date.format("%Y-%m-%d").to_string()], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// The authoritative record for a date, if the date was ever processed.
pub fn latest_record(conn: &Connection, date: NaiveDate) -> Result<Option<DailyProcessingRecord>> {
    Ok(records_for_date(conn, date)?.into_iter().next())
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DailyProcessingRecord> {
    let date_str: String = row.get(1)?;
    let recorded_at_str: String = row.get(2)?;
    let transfers: i64 = row.get(3)?;
    let labels_json: String = row.get(4)?;
    let source_code: String = row.get(6)?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|_| rusqlite::Error::InvalidQuery)?;
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
        .map_err(|_| rusqlite::Error::InvalidQuery)?
        .with_timezone(&Utc);
    let file_labels: Vec<String> =
        serde_json::from_str(&labels_json).map_err(|_| rusqlite::Error::InvalidQuery)?;
    let source_kind = SourceKind::from_code(&source_code).ok_or(rusqlite::Error::InvalidQuery)?;

    Ok(DailyProcessingRecord {
        record_id: row.get(0)?,
        date,
        recorded_at,
        transfers_processed: transfers as usize,
        file_labels,
        fingerprint: row.get(5)?,
        source_kind,
    })
}

// ============================================================================
// PROCESSING STATUS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub date: NaiveDate,
    pub processed: bool,
    pub last_record: Option<DailyProcessingRecord>,
    /// Commit-path hint only, limited to strictly past dates. Same-day
    /// alerting is the scheduler's cutoff-hour decision.
    pub should_alert: bool,
}

pub fn check_processing(
    conn: &Connection,
    date: NaiveDate,
    today: NaiveDate,
    alertable_weekdays: &[Weekday],
) -> Result<ProcessingStatus> {
    let last_record = latest_record(conn, date)?;
    let processed = last_record.is_some();
    let should_alert = !processed && alertable_weekdays.contains(&date.weekday()) && date < today;

    Ok(ProcessingStatus {
        date,
        processed,
        last_record,
        should_alert,
    })
}

// ============================================================================
// CHANGE DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeRecommendation {
    Proceed,
    SkipUnchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeReport {
    pub date: NaiveDate,
    pub is_first_processing_of_day: bool,
    pub has_changes: bool,
    pub changes: Vec<String>,
    pub recommendation: ChangeRecommendation,
    pub previous_fingerprint: Option<String>,
    pub new_fingerprint: String,
}

/// Compare an incoming batch against the authoritative record for its
/// date. Fingerprint equality means nothing moved.
pub fn detect_changes(conn: &Connection, batch: &ProcessingBatch) -> Result<ChangeReport> {
    let new_fingerprint = batch_fingerprint(batch)?;
    let previous = latest_record(conn, batch.date)?;

    let report = match previous {
        None => ChangeReport {
            date: batch.date,
            is_first_processing_of_day: true,
            has_changes: false,
            changes: Vec::new(),
            recommendation: ChangeRecommendation::Proceed,
            previous_fingerprint: None,
            new_fingerprint,
        },
        Some(prev) if prev.fingerprint == new_fingerprint => ChangeReport {
            date: batch.date,
            is_first_processing_of_day: false,
            has_changes: false,
            changes: Vec::new(),
            recommendation: ChangeRecommendation::SkipUnchanged,
            previous_fingerprint: Some(prev.fingerprint),
            new_fingerprint,
        },
        Some(prev) => {
            let changes = describe_changes(&prev, batch);
            ChangeReport {
                date: batch.date,
                is_first_processing_of_day: false,
                has_changes: true,
                changes,
                recommendation: ChangeRecommendation::Proceed,
                previous_fingerprint: Some(prev.fingerprint),
                new_fingerprint,
            }
        }
    };

    Ok(report)
}

fn describe_changes(previous: &DailyProcessingRecord, batch: &ProcessingBatch) -> Vec<String> {
    let mut changes = Vec::new();

    if previous.transfers_processed != batch.transfers_count {
        changes.push(format!(
            "Transfer count changed: {} → {}",
            previous.transfers_processed, batch.transfers_count
        ));
    }

    let old_files: HashSet<String> = previous
        .file_labels
        .iter()
        .map(|label| normalize_token(label))
        .collect();
    let new_files: HashSet<String> = batch
        .file_labels
        .iter()
        .map(|label| normalize_token(label))
        .collect();

    for added in new_files.difference(&old_files) {
        changes.push(format!("File added: {}", added));
    }
    for removed in old_files.difference(&new_files) {
        changes.push(format!("File removed: {}", removed));
    }

    if changes.is_empty() {
        changes.push("Transfer details changed (same count, same files)".to_string());
    }

    changes
}

// ============================================================================
// SENT ALERTS
// ============================================================================

/// Record that an alert went out. Returns false when the (date, kind)
/// pair already exists, which is how double sends are prevented.
pub fn record_sent_alert(conn: &Connection, date: NaiveDate, kind: AlertKind) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO sent_alerts (date, alert_kind, sent_at) VALUES (?1, ?2, ?3)",
        params![
            date.format("%Y-%m-%d").to_string(),
            kind.code(),
            Utc::now().to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e).context("Failed to record sent alert"),
    }
}

pub fn alert_already_sent(conn: &Connection, date: NaiveDate, kind: AlertKind) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sent_alerts WHERE date = ?1 AND alert_kind = ?2",
        params![date.format("%Y-%m-%d").to_string(), kind.code()],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

pub fn sent_alerts_for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<SentAlertRecord>> {
    let mut stmt = conn.prepare(
        "SELECT date, alert_kind, sent_at FROM sent_alerts WHERE date = ?1 ORDER BY sent_at",
    )?;

    let alerts = stmt
        .query_map(params![date.format("%Y-%m-%d").to_string()], |row| {
            let date_str: String = row.get(0)?;
            let kind_code: String = row.get(1)?;
            let sent_at_str: String = row.get(2)?;

            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|_| rusqlite::Error::InvalidQuery)?;
            let alert_kind =
                AlertKind::from_code(&kind_code).ok_or(rusqlite::Error::InvalidQuery)?;
            let sent_at = DateTime::parse_from_rfc3339(&sent_at_str)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc);

            Ok(SentAlertRecord {
                date,
                alert_kind,
                sent_at,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(alerts)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::TransferFact;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_ledger(&conn).unwrap();
        conn
    }

    fn make_batch(date: NaiveDate, vehicles: &[&str]) -> ProcessingBatch {
        let transfers: Vec<TransferFact> = vehicles
            .iter()
            .map(|vehicle| TransferFact {
                vehicle: vehicle.to_string(),
                to_driver: "juan perez".to_string(),
                from_driver: None,
                timestamp: None,
            })
            .collect();

        ProcessingBatch {
            date,
            transfers_count: transfers.len(),
            file_labels: vec!["lunes.txt".to_string()],
            source_kind: SourceKind::ChatTranscript,
            transfers,
        }
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_record_and_latest() {
        let conn = setup();
        let batch = make_batch(friday(), &["ABC-123", "DEF-789"]);

        let record = record_processing(&conn, &batch).unwrap();
        let latest = latest_record(&conn, friday()).unwrap().unwrap();

        assert_eq!(latest, record);
        assert_eq!(latest.transfers_processed, 2);
        assert_eq!(latest.file_labels, vec!["lunes.txt".to_string()]);
        assert!(latest.fingerprint.starts_with("v1:"));
        assert!(latest_record(&conn, friday().succ_opt().unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_history_is_append_only() {
        let conn = setup();

        record_processing(&conn, &make_batch(friday(), &["ABC-123"])).unwrap();
        record_processing(&conn, &make_batch(friday(), &["ABC-123", "DEF-789"])).unwrap();

        let history = records_for_date(&conn, friday()).unwrap();
        assert_eq!(history.len(), 2);
        // Most recent first, and it is the authoritative one.
        assert_eq!(history[0].transfers_processed, 2);
        assert_eq!(history[1].transfers_processed, 1);

        let latest = latest_record(&conn, friday()).unwrap().unwrap();
        assert_eq!(latest.transfers_processed, 2);

        println!("✅ Historial append-only: {} registros", history.len());
    }

    #[test]
    fn test_detect_changes_first_processing() {
        let conn = setup();
        let report = detect_changes(&conn, &make_batch(friday(), &["ABC-123"])).unwrap();

        assert!(report.is_first_processing_of_day);
        assert!(!report.has_changes);
        assert_eq!(report.recommendation, ChangeRecommendation::Proceed);
        assert!(report.previous_fingerprint.is_none());
    }

    #[test]
    fn test_detect_changes_identical_batch() {
        let conn = setup();
        let batch = make_batch(friday(), &["ABC-123", "DEF-789"]);

        record_processing(&conn, &batch).unwrap();
        let report = detect_changes(&conn, &batch).unwrap();

        assert!(!report.is_first_processing_of_day);
        assert!(!report.has_changes);
        assert_eq!(report.recommendation, ChangeRecommendation::SkipUnchanged);
        assert_eq!(report.previous_fingerprint, Some(report.new_fingerprint.clone()));
    }

    #[test]
    fn test_detect_changes_extra_transfer() {
        let conn = setup();

        record_processing(&conn, &make_batch(friday(), &["ABC-123", "DEF-789"])).unwrap();
        let report = detect_changes(
            &conn,
            &make_batch(friday(), &["ABC-123", "DEF-789", "XYZ-987"]),
        )
        .unwrap();

        assert!(report.has_changes);
        assert_eq!(report.recommendation, ChangeRecommendation::Proceed);
        assert!(report
            .changes
            .contains(&"Transfer count changed: 2 → 3".to_string()));
    }

    #[test]
    fn test_detect_changes_file_swap() {
        let conn = setup();
        let batch = make_batch(friday(), &["ABC-123"]);
        record_processing(&conn, &batch).unwrap();

        let mut renamed = make_batch(friday(), &["ABC-123"]);
        renamed.file_labels = vec!["martes.txt".to_string()];
        let report = detect_changes(&conn, &renamed).unwrap();

        assert!(report.has_changes);
        assert!(report.changes.contains(&"File added: martes.txt".to_string()));
        assert!(report.changes.contains(&"File removed: lunes.txt".to_string()));
    }

    #[test]
    fn test_detect_changes_details_only() {
        let conn = setup();
        record_processing(&conn, &make_batch(friday(), &["ABC-123"])).unwrap();

        let report = detect_changes(&conn, &make_batch(friday(), &["XYZ-987"])).unwrap();

        assert!(report.has_changes);
        assert_eq!(
            report.changes,
            vec!["Transfer details changed (same count, same files)".to_string()]
        );
    }

    #[test]
    fn test_sent_alert_recorded_exactly_once() {
        let conn = setup();

        assert!(record_sent_alert(&conn, friday(), AlertKind::DailyProcessing).unwrap());
        assert!(!record_sent_alert(&conn, friday(), AlertKind::DailyProcessing).unwrap());
        assert!(alert_already_sent(&conn, friday(), AlertKind::DailyProcessing).unwrap());

        let alerts = sent_alerts_for_date(&conn, friday()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_kind, AlertKind::DailyProcessing);
    }

    #[test]
    fn test_check_processing_should_alert() {
        let conn = setup();
        let weekdays = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
        ];
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 18).unwrap();

        // Unprocessed working day in the past.
        let status = check_processing(&conn, friday(), monday, &weekdays).unwrap();
        assert!(!status.processed);
        assert!(status.should_alert);

        // Sunday is not alertable.
        let status = check_processing(&conn, sunday, monday, &weekdays).unwrap();
        assert!(!status.should_alert);

        // Today itself is left to the scheduler.
        let status = check_processing(&conn, monday, monday, &weekdays).unwrap();
        assert!(!status.should_alert);

        // Once processed, never alertable.
        record_processing(&conn, &make_batch(saturday, &["ABC-123"])).unwrap();
        let status = check_processing(&conn, saturday, monday, &weekdays).unwrap();
        assert!(status.processed);
        assert!(!status.should_alert);
        assert!(status.last_record.is_some());
    }
}
