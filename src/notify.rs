// 📣 Notification Boundary - where alerts leave the system
// El transporte real vive fuera; aquí solo el seam y un emisor de consola.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ledger::AlertKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub kind: AlertKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Delivery seam. Implementations must not retry internally: the
/// scheduler owns retry-by-next-tick.
pub trait NotificationSender: Send + Sync {
    fn send(&self, message: &NotificationMessage) -> Result<()>;
}

// ============================================================================
// CONSOLE
// ============================================================================

/// Prints alerts to stdout. The default sender for CLI use.
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        ConsoleNotifier
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSender for ConsoleNotifier {
    fn send(&self, message: &NotificationMessage) -> Result<()> {
        println!("🔔 [{}] {}", message.recipient, message.subject);
        println!("   {}", message.body);
        Ok(())
    }
}

// ============================================================================
// RECORDING (tests)
// ============================================================================

/// Captures messages instead of delivering them, and can be flipped
/// into failure mode to exercise the scheduler's error paths.
pub struct RecordingSender {
    sent: Mutex<Vec<NotificationMessage>>,
    fail: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let sender = Self::new();
        sender.fail.store(true, Ordering::SeqCst);
        sender
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSender for RecordingSender {
    fn send(&self, message: &NotificationMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated delivery failure");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> NotificationMessage {
        NotificationMessage {
            kind: AlertKind::DailyProcessing,
            recipient: "operador".to_string(),
            subject: "Traspasos sin procesar: 15/03/2024".to_string(),
            body: "No hay registro de procesamiento.".to_string(),
        }
    }

    #[test]
    fn test_recording_sender_captures_messages() {
        let sender = RecordingSender::new();

        sender.send(&message()).unwrap();
        sender.send(&message()).unwrap();

        let sent = sender.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].recipient, "operador");
    }

    #[test]
    fn test_failing_sender_errors_without_recording() {
        let sender = RecordingSender::failing();

        assert!(sender.send(&message()).is_err());
        assert!(sender.messages().is_empty());

        sender.set_fail(false);
        sender.send(&message()).unwrap();
        assert_eq!(sender.messages().len(), 1);
    }
}
