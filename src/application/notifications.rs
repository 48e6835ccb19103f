use crate::domain::ports::Notifier;
use crate::error::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Message {
        recipient: String,
        text: String,
    },
    Receipt {
        recipient: String,
        subject: String,
        body: String,
    },
}

impl Notification {
    pub fn message(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Notification::Message {
            recipient: recipient.into(),
            text: text.into(),
        }
    }

    pub fn receipt(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Notification::Receipt {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    fn recipient(&self) -> &str {
        match self {
            Notification::Message { recipient, .. } | Notification::Receipt { recipient, .. } => {
                recipient
            }
        }
    }

    async fn deliver(&self, notifier: &dyn Notifier) -> Result<()> {
        match self {
            Notification::Message { recipient, text } => notifier.send_message(recipient, text).await,
            Notification::Receipt {
                recipient,
                subject,
                body,
            } => notifier.send_receipt(recipient, subject, body).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub workers: usize,
    pub capacity: usize,
    /// Retries after the first failed delivery.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Bounded notification queue drained by a pool of workers.
///
/// `enqueue` never waits: when the queue is full or closed the notification is
/// dropped with a warning. Each delivery is retried with exponential backoff
/// up to `max_retries` times.
pub struct NotificationQueue {
    sender: Mutex<Option<mpsc::Sender<Notification>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationQueue {
    /// Spawns the worker pool. Must be called from within a tokio runtime.
    pub fn start(notifier: Arc<dyn Notifier>, settings: QueueSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..settings.workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let notifier = notifier.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(notification) = next else { break };
                        deliver_with_retry(worker, notifier.as_ref(), &notification, settings).await;
                    }
                    log::debug!("Notification worker {worker} stopped");
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues a notification; returns `false` if it was dropped.
    pub fn enqueue(&self, notification: Notification) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            log::warn!(
                "Notification queue closed, dropping message for {}",
                notification.recipient()
            );
            return false;
        };
        match sender.try_send(notification) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Dropping notification: {e}");
                false
            }
        }
    }

    /// Stops accepting work and waits until every queued notification is handled.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                log::error!("Notification worker panicked: {e}");
            }
        }
    }
}

async fn deliver_with_retry(
    worker: usize,
    notifier: &dyn Notifier,
    notification: &Notification,
    settings: QueueSettings,
) {
    let mut attempt = 0u32;
    loop {
        match notification.deliver(notifier).await {
            Ok(()) => return,
            Err(e) if attempt < settings.max_retries => {
                attempt += 1;
                log::warn!(
                    "[worker {worker}] delivery to {} failed ({e}), retry {attempt}/{}",
                    notification.recipient(),
                    settings.max_retries
                );
                tokio::time::sleep(settings.retry_delay * 2u32.saturating_pow(attempt - 1)).await;
            }
            Err(e) => {
                log::error!(
                    "[worker {worker}] giving up on notification for {}: {e}",
                    notification.recipient()
                );
                return;
            }
        }
    }
}
