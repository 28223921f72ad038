//! Notification sink contract and the bounded two-lane alert queue.

use crate::types::{AlertLevel, NotificationPriority};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::debug;

/// Recipient identifier. Zero is the builtin alert store.
pub type RecipientId = u16;

pub const BUILTIN_RECIPIENT: RecipientId = 0;

/// Serialized flow alert on its way to a recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertNotification {
    pub alert_json: String,
    pub severity: AlertLevel,
}

/// Downstream consumer of alert notifications.
pub trait NotificationSink: Send + Sync {
    /// Non-blocking enqueue. A rejected notification is handed back to the
    /// caller, which owns it again.
    fn enqueue(
        &self,
        recipient: RecipientId,
        priority: NotificationPriority,
        notification: AlertNotification,
    ) -> Result<(), AlertNotification>;
}

/// Bounded queue feeding a single recipient, one channel per priority.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    recipient: RecipientId,
    high: mpsc::Sender<AlertNotification>,
    low: mpsc::Sender<AlertNotification>,
}

impl AlertQueue {
    /// Create a queue for `recipient` with `capacity` slots per lane
    pub fn new(recipient: RecipientId, capacity: usize) -> (Self, AlertReceiver) {
        let capacity = capacity.max(1);
        let (high_tx, high_rx) = mpsc::channel(capacity);
        let (low_tx, low_rx) = mpsc::channel(capacity);
        (
            Self {
                recipient,
                high: high_tx,
                low: low_tx,
            },
            AlertReceiver {
                high: high_rx,
                low: low_rx,
            },
        )
    }

    pub fn recipient(&self) -> RecipientId {
        self.recipient
    }
}

impl NotificationSink for AlertQueue {
    fn enqueue(
        &self,
        recipient: RecipientId,
        priority: NotificationPriority,
        notification: AlertNotification,
    ) -> Result<(), AlertNotification> {
        if recipient != self.recipient {
            debug!("Recipient {} not served by this queue", recipient);
            return Err(notification);
        }

        let lane = match priority {
            NotificationPriority::High => &self.high,
            NotificationPriority::Low => &self.low,
        };

        lane.try_send(notification).map_err(|e| match e {
            TrySendError::Full(n) | TrySendError::Closed(n) => n,
        })
    }
}

/// Consumer end of an [`AlertQueue`]. High priority is always drained first.
#[derive(Debug)]
pub struct AlertReceiver {
    high: mpsc::Receiver<AlertNotification>,
    low: mpsc::Receiver<AlertNotification>,
}

impl AlertReceiver {
    /// Wait for the next notification, `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<AlertNotification> {
        tokio::select! {
            biased;
            Some(n) = self.high.recv() => Some(n),
            Some(n) = self.low.recv() => Some(n),
            else => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<AlertNotification> {
        match self.high.try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => self.low.try_recv().ok(),
        }
    }
}
