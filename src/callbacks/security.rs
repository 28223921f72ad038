//! Security callbacks evaluated once the application protocol is known.

use crate::alert_trigger::FlowAlerter;
use crate::callback::{Capabilities, CallbackState, FlowCallback};
use crate::flow::{Flow, FlowVerdict};
use crate::types::{score, AlertLevel, FlowStatus, ScriptCategory};
use serde_json::{json, Value};

const ON_PROTOCOL_DETECTED: Capabilities = Capabilities {
    protocol_detected: true,
    ..Capabilities::NONE
};

/// Client, server or category is on a blacklist
#[derive(Debug, Default)]
pub struct BlacklistedFlow {
    state: CallbackState,
}

impl BlacklistedFlow {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for BlacklistedFlow {
    callback_identity!(
        "blacklisted",
        ScriptCategory::Security,
        FlowStatus::Blacklisted,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let blacklist = &flow.info().blacklist;
        if !blacklist.any() {
            return;
        }

        let fragment = json!({
            "blacklisted_info": {
                "blacklisted_cli": blacklist.client,
                "blacklisted_srv": blacklist.server,
                "blacklisted_cat": blacklist.category,
            }
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::SEVERE, &fragment);
    }
}

/// Alert raised by an external source (IDS, script) attached to the flow.
///
/// The external record may carry its own `severity_id` and `score`, which
/// take precedence over the configured severity.
#[derive(Debug, Default)]
pub struct ExternalAlertCheck {
    state: CallbackState,
}

impl ExternalAlertCheck {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for ExternalAlertCheck {
    callback_identity!(
        "external_alert_check",
        ScriptCategory::Security,
        FlowStatus::ExternalAlert,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let Some(external) = flow.info().external_alert.clone() else {
            return;
        };

        let severity = external
            .get("severity_id")
            .and_then(Value::as_i64)
            .and_then(AlertLevel::from_id_clamped)
            .unwrap_or_else(|| self.severity());
        let alert_score = external
            .get("score")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(score::NOTICE);

        alerter.trigger_alert(flow, self.status(), severity, alert_score, &external);
    }
}

/// Names of the risk bits reported by protocol detection
const FLOW_RISKS: &[(u32, &str)] = &[
    (1, "url_possible_xss"),
    (2, "url_possible_sql_injection"),
    (3, "url_possible_rce_injection"),
    (4, "binary_application_transfer"),
    (5, "known_protocol_on_non_standard_port"),
    (6, "tls_selfsigned_certificate"),
    (7, "tls_obsolete_version"),
    (8, "tls_weak_cipher"),
    (9, "tls_certificate_expired"),
    (10, "tls_certificate_mismatch"),
    (11, "http_suspicious_user_agent"),
    (12, "http_numeric_ip_host"),
    (13, "http_suspicious_url"),
    (14, "http_suspicious_header"),
    (15, "tls_not_carrying_https"),
    (16, "suspicious_dga_domain"),
    (17, "malformed_packet"),
    (18, "ssh_obsolete_client_version_or_cipher"),
    (19, "ssh_obsolete_server_version_or_cipher"),
    (20, "smb_insecure_version"),
    (21, "tls_suspicious_esni_usage"),
    (22, "unsafe_protocol"),
    (23, "dns_suspicious_traffic"),
    (24, "tls_missing_sni"),
];

fn risk_names(bitmap: u64) -> Vec<&'static str> {
    FLOW_RISKS
        .iter()
        .filter(|(bit, _)| bitmap & (1u64 << bit) != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Protocol detection flagged one or more risks
#[derive(Debug, Default)]
pub struct FlowRisk {
    state: CallbackState,
}

impl FlowRisk {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for FlowRisk {
    callback_identity!(
        "flow_risk",
        ScriptCategory::Security,
        FlowStatus::FlowRisk,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let bitmap = flow.info().risk_bitmap;
        if bitmap == 0 {
            return;
        }

        let fragment = json!({
            "risk_bitmap": bitmap,
            "risks": risk_names(bitmap),
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

/// Inline gateway dropped the flow
#[derive(Debug, Default)]
pub struct NedgeBlockedFlow {
    state: CallbackState,
}

impl NedgeBlockedFlow {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for NedgeBlockedFlow {
    callback_identity!(
        "nedge_blocked",
        ScriptCategory::Security,
        FlowStatus::NedgeBlocked,
        Capabilities {
            nedge_only: true,
            protocol_detected: true,
            ..Capabilities::NONE
        },
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        if flow.info().verdict != FlowVerdict::Drop {
            return;
        }
        let fragment = json!({ "verdict": "drop" });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

/// Neither endpoint belongs to the monitored networks
#[derive(Debug, Default)]
pub struct RemoteToRemote {
    state: CallbackState,
}

impl RemoteToRemote {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for RemoteToRemote {
    callback_identity!(
        "remote_to_remote",
        ScriptCategory::Security,
        FlowStatus::RemoteToRemote,
        Capabilities {
            nedge_exclude: true,
            protocol_detected: true,
            ..Capabilities::NONE
        },
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if info.cli_local || info.srv_local {
            return;
        }
        let fragment = json!({
            "cli_ip": info.cli_ip.to_string(),
            "srv_ip": info.srv_ip.to_string(),
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

/// Cleartext or legacy protocols
const INSECURE_PROTOCOLS: &[&str] = &[
    "FTP_CONTROL",
    "FTP_DATA",
    "Telnet",
    "TFTP",
    "Rlogin",
    "SMBv1",
    "NetBIOS",
    "SNMP",
    "HTTP",
    "POP3",
    "IMAP",
    "SMTP",
];

/// Remote client reaching a local server over an insecure protocol
#[derive(Debug, Default)]
pub struct RemoteToLocalInsecureProto {
    state: CallbackState,
}

impl RemoteToLocalInsecureProto {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for RemoteToLocalInsecureProto {
    callback_identity!(
        "remote_to_local_insecure_proto",
        ScriptCategory::Security,
        FlowStatus::RemoteToLocalInsecureProto,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if info.cli_local || !info.srv_local {
            return;
        }
        let insecure = INSECURE_PROTOCOLS
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&info.app_protocol));
        if !insecure {
            return;
        }

        let fragment = json!({ "l7_proto": info.app_protocol });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::WARNING, &fragment);
    }
}

/// Device policy forbids the detected protocol on either endpoint
#[derive(Debug, Default)]
pub struct DeviceProtocolNotAllowed {
    state: CallbackState,
}

impl DeviceProtocolNotAllowed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for DeviceProtocolNotAllowed {
    callback_identity!(
        "device_protocol_not_allowed",
        ScriptCategory::Security,
        FlowStatus::DeviceProtocolNotAllowed,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if !info.cli_protocol_denied && !info.srv_protocol_denied {
            return;
        }
        let fragment = json!({
            "l7_proto": info.app_protocol,
            "cli_denied": info.cli_protocol_denied,
            "srv_denied": info.srv_protocol_denied,
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::WARNING, &fragment);
    }
}
