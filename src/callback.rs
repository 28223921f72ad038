//! Flow callback abstraction.
//!
//! A callback is a named unit of behavior evaluated against flow lifecycle
//! events. Which events and interfaces it applies to is fixed when the type
//! is defined ([`Capabilities`]); whether it runs and at which severity it
//! alerts comes from the persisted configuration ([`CallbackState`]).

use crate::alert_trigger::FlowAlerter;
use crate::flow::Flow;
use crate::interface::NetworkInterface;
use crate::types::{AlertLevel, EventKind, FlowStatus, ScriptCategory};
use serde_json::Value;

/// Immutable eligibility flags of a callback type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub packet_interface_only: bool,
    pub nedge_exclude: bool,
    pub nedge_only: bool,
    pub protocol_detected: bool,
    pub periodic_update: bool,
    pub flow_end: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        packet_interface_only: false,
        nedge_exclude: false,
        nedge_only: false,
        protocol_detected: false,
        periodic_update: false,
        flow_end: false,
    };

    pub fn handles(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::ProtocolDetected => self.protocol_detected,
            EventKind::PeriodicUpdate => self.periodic_update,
            EventKind::FlowEnd => self.flow_end,
        }
    }

    pub fn is_compatible_with(&self, iface: &dyn NetworkInterface) -> bool {
        if self.packet_interface_only && !iface.is_packet_capture() {
            return false;
        }
        if self.nedge_only && !iface.is_gateway_edition() {
            return false;
        }
        if self.nedge_exclude && iface.is_gateway_edition() {
            return false;
        }
        true
    }
}

/// Configuration-driven state shared by every callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallbackState {
    pub enabled: bool,
    pub severity: AlertLevel,
}

impl CallbackState {
    /// Read `severity_id` from a `script_conf` object.
    ///
    /// Returns false and keeps the current severity when the field is
    /// missing, not an integer, or negative.
    pub fn load_severity(&mut self, config: &Value) -> bool {
        match config
            .get("severity_id")
            .and_then(Value::as_i64)
            .and_then(AlertLevel::from_id_clamped)
        {
            Some(severity) => {
                self.severity = severity;
                true
            }
            None => false,
        }
    }
}

/// Common interface of all flow callbacks.
pub trait FlowCallback: Send + Sync {
    /// Unique name, also the configuration key
    fn name(&self) -> &'static str;

    fn category(&self) -> ScriptCategory;

    /// Status assigned to the flow when this callback fires
    fn status(&self) -> FlowStatus;

    fn capabilities(&self) -> Capabilities;

    fn state(&self) -> &CallbackState;

    fn state_mut(&mut self) -> &mut CallbackState;

    fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    fn enable(&mut self) {
        self.state_mut().enabled = true;
    }

    fn disable(&mut self) {
        self.state_mut().enabled = false;
    }

    fn severity(&self) -> AlertLevel {
        self.state().severity
    }

    fn is_compatible_with_interface(&self, iface: &dyn NetworkInterface) -> bool {
        self.capabilities().is_compatible_with(iface)
    }

    /// Parse this callback's `script_conf` object. Returns false when
    /// required fields are missing.
    fn load_configuration(&mut self, config: &Value) -> bool {
        self.state_mut().load_severity(config)
    }

    fn on_protocol_detected(&self, _flow: &mut dyn Flow, _alerter: &FlowAlerter) {}

    fn on_periodic_update(&self, _flow: &mut dyn Flow, _alerter: &FlowAlerter) {}

    fn on_flow_end(&self, _flow: &mut dyn Flow, _alerter: &FlowAlerter) {}
}

impl<'c> dyn FlowCallback + 'c {
    /// Append this callback to `list` if it is compatible with `iface` and
    /// subscribes to `kind`. The enabled flag is not checked here.
    pub fn register_for_event<'a>(
        &'a self,
        list: &mut Vec<&'a dyn FlowCallback>,
        iface: &dyn NetworkInterface,
        kind: EventKind,
    ) {
        if !self.is_compatible_with_interface(iface) {
            return;
        }
        if self.capabilities().handles(kind) {
            list.push(self);
        }
    }

    /// Run the handler matching `kind`
    pub fn handle(&self, kind: EventKind, flow: &mut dyn Flow, alerter: &FlowAlerter) {
        match kind {
            EventKind::ProtocolDetected => self.on_protocol_detected(flow, alerter),
            EventKind::PeriodicUpdate => self.on_periodic_update(flow, alerter),
            EventKind::FlowEnd => self.on_flow_end(flow, alerter),
        }
    }
}
