//! Transport health callbacks, re-evaluated while the flow is active.

use crate::alert_trigger::FlowAlerter;
use crate::callback::{Capabilities, CallbackState, FlowCallback};
use crate::flow::{Flow, IPPROTO_TCP, IPPROTO_UDP};
use crate::types::{score, FlowStatus, ScriptCategory};
use serde_json::{json, Value};
use tracing::warn;

/// Read an optional ratio in `[0, 1]` from `script_conf`
fn load_ratio(config: &Value, key: &str, target: &mut f64) {
    let Some(raw) = config.get(key) else {
        return;
    };
    match raw.as_f64() {
        Some(ratio) if (0.0..=1.0).contains(&ratio) => *target = ratio,
        _ => warn!("Ignoring invalid {}: {}", key, raw),
    }
}

/// Payload makes up too small a share of the transferred bytes
#[derive(Debug)]
pub struct LowGoodputFlow {
    state: CallbackState,
    min_goodput_ratio: f64,
}

impl LowGoodputFlow {
    pub const DEFAULT_MIN_GOODPUT_RATIO: f64 = 0.6;
    /// Fewer packets than this are not judged
    pub const MIN_PACKETS: u64 = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_goodput_ratio(&self) -> f64 {
        self.min_goodput_ratio
    }

    fn check(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if info.total_packets() < Self::MIN_PACKETS {
            return;
        }
        let Some(ratio) = info.goodput_ratio() else {
            return;
        };
        if ratio >= self.min_goodput_ratio {
            return;
        }

        let fragment = json!({
            "goodput_ratio": ratio,
            "min_goodput_ratio": self.min_goodput_ratio,
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

impl Default for LowGoodputFlow {
    fn default() -> Self {
        Self {
            state: CallbackState::default(),
            min_goodput_ratio: Self::DEFAULT_MIN_GOODPUT_RATIO,
        }
    }
}

impl FlowCallback for LowGoodputFlow {
    callback_identity!(
        "low_goodput",
        ScriptCategory::Network,
        FlowStatus::LowGoodput,
        Capabilities {
            periodic_update: true,
            flow_end: true,
            ..Capabilities::NONE
        },
    );

    fn load_configuration(&mut self, config: &Value) -> bool {
        load_ratio(config, "min_goodput_ratio", &mut self.min_goodput_ratio);
        self.state.load_severity(config)
    }

    fn on_periodic_update(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }

    fn on_flow_end(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }
}

/// A TCP peer advertised a zero receive window
#[derive(Debug, Default)]
pub struct TcpZeroWindow {
    state: CallbackState,
}

impl TcpZeroWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let tcp = &flow.info().tcp;
        if !tcp.cli_zero_window && !tcp.srv_zero_window {
            return;
        }
        let fragment = json!({
            "is_client": tcp.cli_zero_window,
            "is_server": tcp.srv_zero_window,
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

impl FlowCallback for TcpZeroWindow {
    callback_identity!(
        "tcp_zero_window",
        ScriptCategory::Network,
        FlowStatus::TcpZeroWindow,
        Capabilities {
            packet_interface_only: true,
            periodic_update: true,
            flow_end: true,
            ..Capabilities::NONE
        },
    );

    fn on_periodic_update(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }

    fn on_flow_end(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }
}

/// Retransmissions, reordering and loss above a share of all packets
#[derive(Debug)]
pub struct TcpIssues {
    state: CallbackState,
    max_issue_ratio: f64,
}

impl TcpIssues {
    pub const DEFAULT_MAX_ISSUE_RATIO: f64 = 0.1;
    pub const MIN_PACKETS: u64 = 16;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_issue_ratio(&self) -> f64 {
        self.max_issue_ratio
    }

    fn check(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        let packets = info.total_packets();
        if info.protocol != IPPROTO_TCP || packets < Self::MIN_PACKETS {
            return;
        }
        let tcp = &info.tcp;
        let issues = tcp
            .retransmissions
            .saturating_add(tcp.out_of_order)
            .saturating_add(tcp.lost);
        let ratio = issues as f64 / packets as f64;
        if ratio <= self.max_issue_ratio {
            return;
        }

        let fragment = json!({
            "retransmissions": tcp.retransmissions,
            "out_of_order": tcp.out_of_order,
            "lost": tcp.lost,
            "packets": packets,
        });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::NOTICE, &fragment);
    }
}

impl Default for TcpIssues {
    fn default() -> Self {
        Self {
            state: CallbackState::default(),
            max_issue_ratio: Self::DEFAULT_MAX_ISSUE_RATIO,
        }
    }
}

impl FlowCallback for TcpIssues {
    callback_identity!(
        "tcp_issues",
        ScriptCategory::Network,
        FlowStatus::TcpIssues,
        Capabilities {
            packet_interface_only: true,
            periodic_update: true,
            flow_end: true,
            ..Capabilities::NONE
        },
    );

    fn load_configuration(&mut self, config: &Value) -> bool {
        load_ratio(config, "max_issue_ratio", &mut self.max_issue_ratio);
        self.state.load_severity(config)
    }

    fn on_periodic_update(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }

    fn on_flow_end(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        self.check(flow, alerter);
    }
}

/// UDP flow that never saw a reply
#[derive(Debug, Default)]
pub struct UdpUnidirectional {
    state: CallbackState,
}

impl UdpUnidirectional {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowCallback for UdpUnidirectional {
    callback_identity!(
        "udp_unidirectional",
        ScriptCategory::Network,
        FlowStatus::UdpUnidirectional,
        Capabilities {
            flow_end: true,
            ..Capabilities::NONE
        },
    );

    fn on_flow_end(&self, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        let info = flow.info();
        if info.protocol != IPPROTO_UDP
            || info.cli2srv_packets == 0
            || info.srv2cli_packets != 0
            || info.server_is_broadcast_or_multicast()
        {
            return;
        }

        let fragment = json!({ "cli2srv_packets": info.cli2srv_packets });
        alerter.trigger_alert(flow, self.status(), self.severity(), score::INFO, &fragment);
    }
}
