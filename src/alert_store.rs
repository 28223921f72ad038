//! Builtin alert recipient
//!
//! Keeps the most recent delivered flow alerts in memory and logs each one
//! according to its severity.

use crate::notification::AlertNotification;
use crate::types::AlertLevel;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

/// Flow alert as retained by the store
#[derive(Clone, Debug)]
pub struct StoredAlert {
    pub received: DateTime<Utc>,
    pub severity: AlertLevel,
    /// Supersedes an earlier alert on the same flow
    pub replaces_previous: bool,
    pub record: Value,
}

impl StoredAlert {
    fn from_notification(notification: AlertNotification) -> Self {
        let record = serde_json::from_str(&notification.alert_json)
            .unwrap_or(Value::String(notification.alert_json));
        let replaces_previous = record
            .get("replace_alert")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            received: Utc::now(),
            severity: notification.severity,
            replaces_previous,
            record,
        }
    }

    pub fn flow_id(&self) -> Option<u64> {
        self.record.get("flow_id").and_then(Value::as_u64)
    }
}

/// Bounded in-memory alert store
pub struct AlertStore {
    alerts: Mutex<VecDeque<StoredAlert>>,
    max_alerts: usize,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_alerts: usize) -> Self {
        let max_alerts = max_alerts.max(1);
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(max_alerts)),
            max_alerts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StoredAlert>> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a delivered notification
    pub fn store(&self, notification: AlertNotification) {
        let alert = StoredAlert::from_notification(notification);
        let flow = alert.flow_id().map_or_else(|| "?".to_string(), |id| id.to_string());
        let status = alert.record.get("alerted_status").cloned().unwrap_or(Value::Null);

        match alert.severity {
            AlertLevel::Error | AlertLevel::Critical | AlertLevel::Alert | AlertLevel::Emergency => {
                error!(
                    "🚨 {} flow alert: flow={}, status={}, replace={}",
                    alert.severity, flow, status, alert.replaces_previous
                );
            }
            AlertLevel::Warning => {
                warn!(
                    "⚠️  {} flow alert: flow={}, status={}, replace={}",
                    alert.severity, flow, status, alert.replaces_previous
                );
            }
            _ => {
                info!(
                    "ℹ️  {} flow alert: flow={}, status={}, replace={}",
                    alert.severity, flow, status, alert.replaces_previous
                );
            }
        }

        let mut alerts = self.lock();
        if alerts.len() >= self.max_alerts {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    /// Alerts at or above `min_severity`, oldest first
    pub fn alerts_at_least(&self, min_severity: AlertLevel) -> Vec<StoredAlert> {
        self.lock()
            .iter()
            .filter(|a| a.severity >= min_severity)
            .cloned()
            .collect()
    }

    pub fn count_by_severity(&self, severity: AlertLevel) -> usize {
        self.lock().iter().filter(|a| a.severity == severity).count()
    }

    /// Number of stored alerts that replaced an earlier one
    pub fn replacements(&self) -> usize {
        self.lock().iter().filter(|a| a.replaces_previous).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn total_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}
