//! Data leaving the network through unusual channels.

use crate::alert_trigger::FlowAlerter;
use crate::callback::{Capabilities, CallbackState, FlowCallback};
use crate::flow::Flow;
use crate::types::{score, FlowStatus, ScriptCategory};
use serde_json::{json, Value};
use tracing::warn;

fn load_u64(config: &Value, key: &str, target: &mut u64) {
    let Some(raw) = config.get(key) else {
        return;
    };
    match raw.as_u64() {
        Some(value) if value > 0 => *target = value,
        _ => warn!("Ignoring invalid {}: {}", key, raw),
    }
}

/// DNS query names long enough to carry tunnelled payload
#[derive(Debug)]
pub struct DnsDataExfiltration {
    state: CallbackState,
    max_query_len: u64,
}

impl DnsDataExfiltration {
    pub const DEFAULT_MAX_QUERY_LEN: u64 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_query_len(&self) -> u64 {
        self.max_query_len
    }

    fn check(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if !info.app_protocol.eq_ignore_ascii_case("DNS") {
            return;
        }
        let Some(query) = &info.dns_query else {
            return;
        };
        if query.len() as u64 <= self.max_query_len {
            return;
        }

        let fragment = json!({
            "query": query,
            "query_len": query.len(),
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::WARNING, &fragment);
    }
}

impl Default for DnsDataExfiltration {
    fn default() -> Self {
        Self {
            state: CallbackState::default(),
            max_query_len: Self::DEFAULT_MAX_QUERY_LEN,
        }
    }
}

impl FlowCallback for DnsDataExfiltration {
    callback_identity!(
        "dns_data_exfiltration",
        ScriptCategory::Security,
        FlowStatus::DnsDataExfiltration,
        Capabilities {
            periodic_update: true,
            flow_end: true,
            ..Capabilities::NONE
        },
    );

    fn load_configuration(&mut self, config: &Value) -> bool {
        load_u64(config, "max_query_len", &mut self.max_query_len);
        self.state.load_severity(config)
    }

    fn on_periodic_update(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }

    fn on_flow_end(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }
}

/// Large, mostly one-way upload from a local host to a remote one
#[derive(Debug)]
pub struct DataExfiltration {
    state: CallbackState,
    min_upload_bytes: u64,
}

impl DataExfiltration {
    pub const DEFAULT_MIN_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
    /// Upload must exceed download by this factor
    pub const UPLOAD_FACTOR: u64 = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_upload_bytes(&self) -> u64 {
        self.min_upload_bytes
    }
}

impl Default for DataExfiltration {
    fn default() -> Self {
        Self {
            state: CallbackState::default(),
            min_upload_bytes: Self::DEFAULT_MIN_UPLOAD_BYTES,
        }
    }
}

impl FlowCallback for DataExfiltration {
    callback_identity!(
        "data_exfiltration",
        ScriptCategory::Security,
        FlowStatus::DataExfiltration,
        Capabilities {
            flow_end: true,
            ..Capabilities::NONE
        },
    );

    fn load_configuration(&mut self, config: &Value) -> bool {
        load_u64(config, "min_upload_bytes", &mut self.min_upload_bytes);
        self.state.load_severity(config)
    }

    fn on_flow_end(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if !info.cli_local || info.srv_local {
            return;
        }
        let upload = info.cli2srv_bytes;
        let download = info.srv2cli_bytes;
        if upload < self.min_upload_bytes || upload < download.saturating_mul(Self::UPLOAD_FACTOR) {
            return;
        }

        let fragment = json!({
            "cli2srv_bytes": upload,
            "srv2cli_bytes": download,
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::ERROR, &fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::testing::{alerter, flow, next_fragment};
    use crate::flow::FlowInfo;

    #[test]
    fn test_dns_long_query() {
        let (alerter, mut rx) = alerter();
        let mut cb = DnsDataExfiltration::new();
        cb.load_configuration(&json!({"max_query_len": 20}));
        assert_eq!(cb.max_query_len(), 20);

        let mut short = flow(FlowInfo {
            app_protocol: "DNS".into(),
            dns_query: Some("example.com".into()),
            ..FlowInfo::default()
        });
        cb.on_periodic_update(&mut short, &alerter);
        assert!(rx.try_recv().is_none());

        let mut long = flow(FlowInfo {
            app_protocol: "DNS".into(),
            dns_query: Some("aGVsbG8gd29ybGQgaGVsbG8.tunnel.example.com".into()),
            ..FlowInfo::default()
        });
        cb.on_flow_end(&mut long, &alerter);
        assert_eq!(next_fragment(&mut rx).unwrap()["query_len"], 42);
    }

    #[test]
    fn test_dns_rejects_zero_threshold() {
        let mut cb = DnsDataExfiltration::new();
        cb.load_configuration(&json!({"max_query_len": 0}));
        assert_eq!(cb.max_query_len(), DnsDataExfiltration::DEFAULT_MAX_QUERY_LEN);
    }

    #[test]
    fn test_data_exfiltration_upload() {
        let (alerter, mut rx) = alerter();
        let mut cb = DataExfiltration::new();
        cb.load_configuration(&json!({"min_upload_bytes": 1000}));

        let mut balanced = flow(FlowInfo {
            cli_local: true,
            cli2srv_bytes: 5000,
            srv2cli_bytes: 4000,
            ..FlowInfo::default()
        });
        cb.on_flow_end(&mut balanced, &alerter);
        assert!(rx.try_recv().is_none());

        let mut upload = flow(FlowInfo {
            cli_local: true,
            cli2srv_bytes: 50_000,
            srv2cli_bytes: 100,
            ..FlowInfo::default()
        });
        cb.on_flow_end(&mut upload, &alerter);
        assert_eq!(next_fragment(&mut rx).unwrap()["cli2srv_bytes"], 50_000);
    }
}
