//! Shared enums for callbacks, alerts and dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity, ordered from least to most important.
///
/// The numeric ids are the ones persisted as `severity_id` in the
/// callback configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    None = 0,
    Debug = 1,
    Info = 2,
    Notice = 3,
    #[default]
    Warning = 4,
    Error = 5,
    Critical = 6,
    Alert = 7,
    Emergency = 8,
}

impl AlertLevel {
    /// Exclusive upper bound of valid severity ids.
    pub const MAX_LEVEL: i64 = 9;

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Map a configured id to a level. Ids at or above [`Self::MAX_LEVEL`]
    /// clamp to [`AlertLevel::Emergency`]; negative ids are rejected.
    pub fn from_id_clamped(id: i64) -> Option<Self> {
        let level = match id {
            i64::MIN..=-1 => return None,
            0 => Self::None,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Notice,
            4 => Self::Warning,
            5 => Self::Error,
            6 => Self::Critical,
            7 => Self::Alert,
            _ => Self::Emergency,
        };
        Some(level)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow status assigned by a callback when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Normal = 0,
    Blacklisted = 1,
    ExternalAlert = 2,
    FlowRisk = 3,
    LowGoodput = 4,
    NedgeBlocked = 5,
    TcpZeroWindow = 6,
    TcpIssues = 7,
    UdpUnidirectional = 8,
    RemoteToRemote = 9,
    RemoteToLocalInsecureProto = 10,
    DeviceProtocolNotAllowed = 11,
    TlsCertificateExpired = 12,
    TlsCertificateMismatch = 13,
    TlsOldProtocolVersion = 14,
    TlsUnsafeCiphers = 15,
    DnsDataExfiltration = 16,
    DataExfiltration = 17,
}

impl FlowStatus {
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Descriptive classification of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    Other,
    Security,
    Network,
    Internals,
}

/// Flow lifecycle events a callback can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProtocolDetected,
    PeriodicUpdate,
    FlowEnd,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ProtocolDetected => "protocol_detected",
            Self::PeriodicUpdate => "periodic_update",
            Self::FlowEnd => "flow_end",
        };
        f.write_str(s)
    }
}

/// Delivery priority of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationPriority {
    High,
    Low,
}

impl NotificationPriority {
    /// Error and above go out on the high priority lane.
    pub fn for_severity(severity: AlertLevel) -> Self {
        if severity >= AlertLevel::Error {
            Self::High
        } else {
            Self::Low
        }
    }
}

/// Score levels attached to flow alerts.
pub mod score {
    pub const INFO: u16 = 10;
    pub const NOTICE: u16 = 50;
    pub const WARNING: u16 = 80;
    pub const ERROR: u16 = 100;
    pub const SEVERE: u16 = 150;
}
