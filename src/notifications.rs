//! Best-effort customer notifications.
//!
//! Request handlers push onto a bounded channel after their transaction commits and
//! never wait for delivery. A background worker drains the channel and hands each
//! notification to a [`NotificationSink`], retrying with backoff.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OrderConfirmed {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
    },
    OrderShipped {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        tracking_number: Option<String>,
    },
    OrderDelivered {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
    },
}

impl Notification {
    pub fn order_id(&self) -> Uuid {
        match self {
            Notification::OrderConfirmed { order_id, .. }
            | Notification::OrderShipped { order_id, .. }
            | Notification::OrderDelivered { order_id, .. } => *order_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("notification queue is full")]
    Full,
    #[error("notification worker has stopped")]
    Closed,
}

/// Sending half of the notification channel, cheap to clone into state.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, notification: Notification) -> Result<(), EnqueueError> {
        self.tx.try_send(notification).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Enqueue and log on failure. Never fails the caller.
    pub fn notify(&self, notification: Notification) {
        let order_id = notification.order_id();
        if let Err(err) = self.enqueue(notification) {
            tracing::warn!(error = %err, %order_id, "failed to queue notification");
        }
    }
}

/// Delivery channel (email, SMS). Implemented outside this crate.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = serde_json::to_string(notification)?;
        tracing::info!(order_id = %notification.order_id(), %payload, "notification delivered");
        Ok(())
    }
}

pub struct NotificationWorker {
    sink: Arc<dyn NotificationSink>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl NotificationWorker {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, base_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_backoff = base_backoff;
        self
    }

    /// Runs until every [`Notifier`] has been dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Notification>) {
        tracing::info!("notification worker started");
        while let Some(notification) = rx.recv().await {
            self.deliver_with_retry(&notification).await;
        }
        tracing::info!("notification channel closed, worker stopping");
    }

    async fn deliver_with_retry(&self, notification: &Notification) -> bool {
        let mut attempt = 1;
        loop {
            match self.sink.deliver(notification).await {
                Ok(()) => return true,
                Err(err) if attempt < self.max_attempts => {
                    let backoff = self.base_backoff * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        order_id = %notification.order_id(),
                        "notification delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        attempts = attempt,
                        order_id = %notification.order_id(),
                        "notification dropped"
                    );
                    return false;
                }
            }
        }
    }
}
