use crate::domain::ports::Notifier;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Writes notifications to the log instead of an SMS or email gateway.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
        log::info!("SMS to {recipient}: {text}");
        Ok(())
    }

    async fn send_receipt(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        log::info!("Email to {recipient} [{subject}]: {body}");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Message { recipient: String, text: String },
    Receipt { recipient: String, subject: String, body: String },
}

impl Delivered {
    pub fn recipient(&self) -> &str {
        match self {
            Delivered::Message { recipient, .. } | Delivered::Receipt { recipient, .. } => recipient,
        }
    }
}

#[derive(Default)]
struct Outbox {
    delivered: Vec<Delivered>,
    failures_pending: u32,
    attempts: u32,
}

/// Keeps every delivered notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    outbox: Mutex<Outbox>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `count` deliveries fail.
    pub fn fail_next(&self, count: u32) {
        self.outbox().failures_pending = count;
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.outbox().delivered.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.outbox().attempts
    }

    fn record(&self, delivered: Delivered) -> Result<()> {
        let mut outbox = self.outbox();
        outbox.attempts += 1;
        if outbox.failures_pending > 0 {
            outbox.failures_pending -= 1;
            return Err(LedgerError::InternalError(Box::new(std::io::Error::other(
                format!("gateway refused message for {}", delivered.recipient()),
            ))));
        }
        outbox.delivered.push(delivered);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
        self.record(Delivered::Message {
            recipient: recipient.to_string(),
            text: text.to_string(),
        })
    }

    async fn send_receipt(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        self.record(Delivered::Receipt {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}
