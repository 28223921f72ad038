//! TLS handshake checks.

use crate::alert_trigger::FlowAlerter;
use crate::callback::{Capabilities, CallbackState, FlowCallback};
use crate::flow::Flow;
use crate::types::{score, FlowStatus, ScriptCategory};
use chrono::Utc;
use serde_json::json;

const ON_PROTOCOL_DETECTED: Capabilities = Capabilities {
    protocol_detected: true,
    ..Capabilities::NONE
};

const TLS_1_2: u16 = 0x0303;

fn version_name(version: u16) -> &'static str {
    match version {
        0x0300 => "SSLv3",
        0x0301 => "TLSv1",
        0x0302 => "TLSv1.1",
        0x0303 => "TLSv1.2",
        0x0304 => "TLSv1.3",
        _ => "unknown",
    }
}

/// Case-insensitive host match honoring a single leading `*.` label
fn name_matches(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        }
    } else {
        pattern.eq_ignore_ascii_case(host)
    }
}

/// Certificate is outside its validity window
#[derive(Debug, Default)]
pub struct TlsCertificateExpired {
    state: CallbackState,
}

impl TlsCertificateExpired {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for TlsCertificateExpired {
    callback_identity!(
        "tls_certificate_expired",
        ScriptCategory::Security,
        FlowStatus::TlsCertificateExpired,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let Some(tls) = &flow.info().tls else {
            return;
        };
        let now = Utc::now();
        let not_yet_valid = tls.not_before.is_some_and(|t| now < t);
        let expired = tls.not_after.is_some_and(|t| now > t);
        if !not_yet_valid && !expired {
            return;
        }

        let fragment = json!({
            "tls_crt.notBefore": tls.not_before.map(|t| t.timestamp()),
            "tls_crt.notAfter": tls.not_after.map(|t| t.timestamp()),
            "tls_crt.now": now.timestamp(),
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::WARNING, &fragment);
    }
}

/// Requested server name not covered by the certificate
#[derive(Debug, Default)]
pub struct TlsCertificateMismatch {
    state: CallbackState,
}

impl TlsCertificateMismatch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for TlsCertificateMismatch {
    callback_identity!(
        "tls_certificate_mismatch",
        ScriptCategory::Security,
        FlowStatus::TlsCertificateMismatch,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let Some(tls) = &flow.info().tls else {
            return;
        };
        let Some(sni) = &tls.server_name else {
            return;
        };
        if tls.certificate_names.is_empty()
            || tls.certificate_names.iter().any(|name| name_matches(name, sni))
        {
            return;
        }

        let fragment = json!({
            "client_requested_server_name": sni,
            "server_names": tls.certificate_names.join(","),
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::WARNING, &fragment);
    }
}

/// Negotiated version older than TLS 1.2
#[derive(Debug, Default)]
pub struct TlsOldProtocolVersion {
    state: CallbackState,
}

impl TlsOldProtocolVersion {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for TlsOldProtocolVersion {
    callback_identity!(
        "tls_old_protocol_version",
        ScriptCategory::Security,
        FlowStatus::TlsOldProtocolVersion,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let Some(tls) = &flow.info().tls else {
            return;
        };
        if tls.version == 0 || tls.version >= TLS_1_2 {
            return;
        }

        let fragment = json!({
            "tls_version": tls.version,
            "tls_version_name": version_name(tls.version),
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

/// Weak cipher suite negotiated
#[derive(Debug, Default)]
pub struct TlsUnsafeCiphers {
    state: CallbackState,
}

impl TlsUnsafeCiphers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for TlsUnsafeCiphers {
    callback_identity!(
        "tls_unsafe_ciphers",
        ScriptCategory::Security,
        FlowStatus::TlsUnsafeCiphers,
        ON_PROTOCOL_DETECTED,
    );

    fn on_protocol_detected(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let weak = flow.info().tls.as_ref().is_some_and(|tls| tls.weak_cipher);
        if !weak {
            return;
        }
        let fragment = json!({ "weak_cipher": true });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}
