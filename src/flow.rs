//! Flow contract consumed by callbacks, plus the reference flow record.

use crate::interface::NetworkInterface;
use crate::types::{AlertLevel, FlowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// A tracked conversation as seen by callbacks.
///
/// The engine owns flows; callbacks only borrow them for the duration of
/// one event.
pub trait Flow: Send {
    /// Statistics snapshot inspected by callbacks
    fn info(&self) -> &FlowInfo;

    fn is_alerted(&self) -> bool;

    /// Record an alert on the flow. Returns false when flow-level policy
    /// suppresses it.
    fn trigger_alert(
        &mut self,
        status: FlowStatus,
        severity: AlertLevel,
        score: u16,
        alert_json: &Value,
    ) -> bool;

    /// Full alert snapshot of the flow
    fn to_alert_json(&self, now: DateTime<Utc>) -> Map<String, Value>;

    fn interface(&self) -> Option<&dyn NetworkInterface>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistInfo {
    pub client: bool,
    pub server: bool,
    pub category: bool,
}

impl BlacklistInfo {
    pub fn any(&self) -> bool {
        self.client || self.server || self.category
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpStats {
    pub cli_zero_window: bool,
    pub srv_zero_window: bool,
    pub retransmissions: u64,
    pub out_of_order: u64,
    pub lost: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsInfo {
    /// Negotiated version, e.g. 0x0303 for TLS 1.2
    pub version: u16,
    pub server_name: Option<String>,
    pub certificate_names: Vec<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub weak_cipher: bool,
}

/// Verdict of the inline gateway on this flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowVerdict {
    #[default]
    Pass,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowInfo {
    pub cli_ip: IpAddr,
    pub srv_ip: IpAddr,
    pub cli_port: u16,
    pub srv_port: u16,
    /// IANA L4 protocol number
    pub protocol: u8,
    /// Detected application protocol name
    pub app_protocol: String,
    pub cli_local: bool,
    pub srv_local: bool,
    pub cli2srv_bytes: u64,
    pub srv2cli_bytes: u64,
    pub cli2srv_packets: u64,
    pub srv2cli_packets: u64,
    pub cli2srv_goodput_bytes: u64,
    pub srv2cli_goodput_bytes: u64,
    pub risk_bitmap: u64,
    pub blacklist: BlacklistInfo,
    pub external_alert: Option<Value>,
    pub tcp: TcpStats,
    pub tls: Option<TlsInfo>,
    pub dns_query: Option<String>,
    pub cli_protocol_denied: bool,
    pub srv_protocol_denied: bool,
    pub verdict: FlowVerdict,
}

impl Default for FlowInfo {
    fn default() -> Self {
        Self {
            cli_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            srv_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            cli_port: 0,
            srv_port: 0,
            protocol: 0,
            app_protocol: String::new(),
            cli_local: false,
            srv_local: false,
            cli2srv_bytes: 0,
            srv2cli_bytes: 0,
            cli2srv_packets: 0,
            srv2cli_packets: 0,
            cli2srv_goodput_bytes: 0,
            srv2cli_goodput_bytes: 0,
            risk_bitmap: 0,
            blacklist: BlacklistInfo::default(),
            external_alert: None,
            tcp: TcpStats::default(),
            tls: None,
            dns_query: None,
            cli_protocol_denied: false,
            srv_protocol_denied: false,
            verdict: FlowVerdict::Pass,
        }
    }
}

impl FlowInfo {
    pub fn total_bytes(&self) -> u64 {
        self.cli2srv_bytes.saturating_add(self.srv2cli_bytes)
    }

    pub fn total_packets(&self) -> u64 {
        self.cli2srv_packets.saturating_add(self.srv2cli_packets)
    }

    /// Share of payload bytes over all bytes, `None` with no traffic
    pub fn goodput_ratio(&self) -> Option<f64> {
        let total = self.total_bytes();
        if total == 0 {
            return None;
        }
        let goodput = self
            .cli2srv_goodput_bytes
            .saturating_add(self.srv2cli_goodput_bytes);
        Some(goodput as f64 / total as f64)
    }

    pub fn server_is_broadcast_or_multicast(&self) -> bool {
        match self.srv_ip {
            IpAddr::V4(ip) => ip.is_broadcast() || ip.is_multicast(),
            IpAddr::V6(ip) => ip.is_multicast(),
        }
    }
}

/// Predominant alert currently recorded on a flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowAlert {
    pub status: FlowStatus,
    pub severity: AlertLevel,
    pub score: u16,
    pub json: Value,
}

/// Reference flow used by the daemon and tests.
///
/// Each status fires at most once per flow. A new status becomes the
/// predominant alert when its score is not lower than the current one.
pub struct FlowRecord {
    id: u64,
    info: FlowInfo,
    iface: Option<Arc<dyn NetworkInterface>>,
    triggered: BTreeSet<FlowStatus>,
    alert: Option<FlowAlert>,
}

impl FlowRecord {
    pub fn new(id: u64, info: FlowInfo, iface: Option<Arc<dyn NetworkInterface>>) -> Self {
        Self {
            id,
            info,
            iface,
            triggered: BTreeSet::new(),
            alert: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Replace the statistics snapshot, keeping alert state
    pub fn update_info(&mut self, info: FlowInfo) {
        self.info = info;
    }

    pub fn info_mut(&mut self) -> &mut FlowInfo {
        &mut self.info
    }

    pub fn alert(&self) -> Option<&FlowAlert> {
        self.alert.as_ref()
    }

    pub fn has_status(&self, status: FlowStatus) -> bool {
        self.triggered.contains(&status)
    }
}

impl Flow for FlowRecord {
    fn info(&self) -> &FlowInfo {
        &self.info
    }

    fn is_alerted(&self) -> bool {
        self.alert.is_some()
    }

    fn trigger_alert(
        &mut self,
        status: FlowStatus,
        severity: AlertLevel,
        score: u16,
        alert_json: &Value,
    ) -> bool {
        if !self.triggered.insert(status) {
            return false;
        }

        if let Some(current) = &self.alert {
            if score < current.score {
                return false;
            }
        }

        self.alert = Some(FlowAlert {
            status,
            severity,
            score,
            json: alert_json.clone(),
        });
        true
    }

    fn to_alert_json(&self, now: DateTime<Utc>) -> Map<String, Value> {
        let info = &self.info;
        let mut out = Map::new();

        out.insert("flow_id".into(), self.id.into());
        out.insert("tstamp".into(), now.timestamp().into());
        if let Some(iface) = &self.iface {
            out.insert("ifname".into(), iface.name().into());
        }
        out.insert("cli_ip".into(), info.cli_ip.to_string().into());
        out.insert("cli_port".into(), info.cli_port.into());
        out.insert("srv_ip".into(), info.srv_ip.to_string().into());
        out.insert("srv_port".into(), info.srv_port.into());
        out.insert("proto".into(), info.protocol.into());
        out.insert("l7_proto".into(), info.app_protocol.clone().into());
        out.insert("cli2srv_bytes".into(), info.cli2srv_bytes.into());
        out.insert("srv2cli_bytes".into(), info.srv2cli_bytes.into());

        if let Some(alert) = &self.alert {
            out.insert("alerted_status".into(), alert.status.id().into());
            out.insert("severity".into(), alert.severity.id().into());
            out.insert("score".into(), alert.score.into());
            out.insert("alert_json".into(), alert.json.to_string().into());
        }

        out
    }

    fn interface(&self) -> Option<&dyn NetworkInterface> {
        self.iface.as_deref()
    }
}
