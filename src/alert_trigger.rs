//! Flow alert trigger shared by every callback.
//!
//! Turns a detected condition into a serialized alert record and hands it
//! to the notification sink without ever blocking the event path. When the
//! sink refuses the record it is dropped and counted on the interface.

use crate::flow::Flow;
use crate::notification::{AlertNotification, NotificationSink, RecipientId, BUILTIN_RECIPIENT};
use crate::types::{AlertLevel, FlowStatus, NotificationPriority};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Result of [`FlowAlerter::trigger_alert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The flow refused the alert; nothing was serialized
    Suppressed,
    /// Recorded on the flow and accepted by the sink
    Delivered,
    /// Recorded on the flow, but the sink was saturated and the record dropped
    Dropped,
}

impl TriggerOutcome {
    /// Whether the condition is now recorded on the flow, delivered or not
    pub fn recorded(self) -> bool {
        !matches!(self, Self::Suppressed)
    }
}

/// Alert trigger bound to a notification sink
#[derive(Clone)]
pub struct FlowAlerter {
    sink: Arc<dyn NotificationSink>,
    recipient: RecipientId,
}

impl FlowAlerter {
    /// Alerter delivering to the builtin recipient
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_recipient(sink, BUILTIN_RECIPIENT)
    }

    pub fn with_recipient(sink: Arc<dyn NotificationSink>, recipient: RecipientId) -> Self {
        Self { sink, recipient }
    }

    pub fn trigger_alert(
        &self,
        flow: &mut dyn Flow,
        status: FlowStatus,
        severity: AlertLevel,
        score: u16,
        alert_json: &Value,
    ) -> TriggerOutcome {
        let first_alert = !flow.is_alerted();

        if !flow.trigger_alert(status, severity, score, alert_json) {
            return TriggerOutcome::Suppressed;
        }

        let mut record = flow.to_alert_json(Utc::now());
        if !first_alert {
            record.insert("replace_alert".into(), Value::Bool(true));
        }

        let notification = AlertNotification {
            alert_json: Value::Object(record).to_string(),
            severity,
        };

        let priority = NotificationPriority::for_severity(severity);
        match self.sink.enqueue(self.recipient, priority, notification) {
            Ok(()) => TriggerOutcome::Delivered,
            Err(rejected) => {
                if let Some(iface) = flow.interface() {
                    iface.inc_dropped_alerts(1);
                }
                debug!(
                    "Dropped {} alert ({:?}, {} bytes)",
                    rejected.severity,
                    status,
                    rejected.alert_json.len()
                );
                TriggerOutcome::Dropped
            }
        }
    }
}
