// ⏰ Alert Scheduler - one reminder per unprocessed day, exactly once
// Estado por fecha: Unprocessed → Alerted (terminal). La tabla sent_alerts
// es la única memoria del estado; el scheduler no guarda nada propio.

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rusqlite::Connection;

use crate::ledger::{self, AlertKind};
use crate::notify::{NotificationMessage, NotificationSender};

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub alertable_weekdays: Vec<Weekday>,
    /// Hour after which today itself counts as overdue.
    pub cutoff_hour: u32,
    pub recipient: String,
}

impl AlertPolicy {
    /// Monday through Saturday, 18:00 cutoff.
    pub fn new(recipient: &str) -> Self {
        AlertPolicy {
            alertable_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
            ],
            cutoff_hour: 18,
            recipient: recipient.to_string(),
        }
    }

    pub fn is_alertable(&self, date: NaiveDate) -> bool {
        self.alertable_weekdays.contains(&date.weekday())
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The date is not a working day.
    NotAlertable,
    /// Future date, or today before the cutoff hour.
    NotYetDue,
    AlreadyProcessed,
    AlreadyAlerted,
    /// Delivered. record_persisted = false means the send went out but
    /// the ledger write failed, so the next tick may send a duplicate.
    AlertSent { record_persisted: bool },
    /// Delivery failed. Nothing was recorded; the next tick retries.
    SendFailed { error: String },
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct AlertScheduler {
    policy: AlertPolicy,
}

impl AlertScheduler {
    pub fn new(policy: AlertPolicy) -> Self {
        AlertScheduler { policy }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Decide and, if due, send the reminder for one date.
    ///
    /// Read failures degrade toward sending, never toward silence.
    pub fn tick(
        &self,
        conn: &Connection,
        sender: &dyn NotificationSender,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<TickOutcome> {
        if !self.policy.is_alertable(date) {
            return Ok(TickOutcome::NotAlertable);
        }

        let today = now.date();
        if date > today {
            return Ok(TickOutcome::NotYetDue);
        }
        if date == today && now.time().hour() < self.policy.cutoff_hour {
            return Ok(TickOutcome::NotYetDue);
        }

        let processed = match ledger::latest_record(conn, date) {
            Ok(record) => record.is_some(),
            Err(e) => {
                eprintln!(
                    "⚠️  Ledger read failed for {}: {} (assuming unprocessed)",
                    date, e
                );
                false
            }
        };
        if processed {
            return Ok(TickOutcome::AlreadyProcessed);
        }

        let already_alerted = match ledger::alert_already_sent(conn, date, AlertKind::DailyProcessing)
        {
            Ok(sent) => sent,
            Err(e) => {
                eprintln!(
                    "⚠️  Alert lookup failed for {}: {} (assuming not alerted)",
                    date, e
                );
                false
            }
        };
        if already_alerted {
            return Ok(TickOutcome::AlreadyAlerted);
        }

        let message = self.build_message(date);
        if let Err(e) = sender.send(&message) {
            return Ok(TickOutcome::SendFailed {
                error: e.to_string(),
            });
        }

        // Write after send: the record only exists once delivery succeeded.
        let record_persisted =
            match ledger::record_sent_alert(conn, date, AlertKind::DailyProcessing) {
                Ok(_) => true,
                Err(e) => {
                    eprintln!(
                        "⚠️  Failed to record sent alert for {}: {} (next tick may duplicate)",
                        date, e
                    );
                    false
                }
            };

        Ok(TickOutcome::AlertSent { record_persisted })
    }

    /// Sweep the last days_back dates plus today, oldest first, so a
    /// backlog alerts in chronological order.
    pub fn tick_window(
        &self,
        conn: &Connection,
        sender: &dyn NotificationSender,
        now: NaiveDateTime,
        days_back: i64,
    ) -> Result<Vec<(NaiveDate, TickOutcome)>> {
        let today = now.date();
        let mut outcomes = Vec::new();

        for offset in (0..=days_back).rev() {
            let date = today - Duration::days(offset);
            let outcome = self.tick(conn, sender, date, now)?;
            outcomes.push((date, outcome));
        }

        Ok(outcomes)
    }

    fn build_message(&self, date: NaiveDate) -> NotificationMessage {
        NotificationMessage {
            kind: AlertKind::DailyProcessing,
            recipient: self.policy.recipient.clone(),
            subject: format!("Traspasos sin procesar: {}", date.format("%d/%m/%Y")),
            body: format!(
                "No hay registro de procesamiento para el {}. Corre el pipeline con los chats del día.",
                date.format("%d/%m/%Y")
            ),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
