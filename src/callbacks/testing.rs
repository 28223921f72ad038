use crate::alert_trigger::FlowAlerter;
use crate::flow::{FlowInfo, FlowRecord};
use crate::notification::{AlertQueue, AlertReceiver, BUILTIN_RECIPIENT};
use serde_json::Value;
use std::sync::Arc;

pub fn alerter() -> (FlowAlerter, AlertReceiver) {
    let (queue, rx) = AlertQueue::new(BUILTIN_RECIPIENT, 16);
    (FlowAlerter::new(Arc::new(queue)), rx)
}

pub fn flow(info: FlowInfo) -> FlowRecord {
    FlowRecord::new(1, info, None)
}

/// Condition fragment of the next queued alert
pub fn next_fragment(rx: &mut AlertReceiver) -> Option<Value> {
    let n = rx.try_recv()?;
    let record: Value = serde_json::from_str(&n.alert_json).ok()?;
    serde_json::from_str(record["alert_json"].as_str()?).ok()
}
