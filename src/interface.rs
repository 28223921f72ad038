//! Network interface contract consumed by callbacks and the alert trigger.

use std::sync::atomic::{AtomicU64, Ordering};

/// Traits of the monitored interface that decide callback eligibility.
pub trait NetworkInterface: Send + Sync {
    fn name(&self) -> &str;

    /// Interface is fed by packet capture (as opposed to flow collection).
    fn is_packet_capture(&self) -> bool;

    /// Engine runs as the inline gateway (nEdge) edition.
    fn is_gateway_edition(&self) -> bool;

    fn inc_dropped_alerts(&self, n: u64);
}

/// Interface handle with an atomic dropped-alert counter
#[derive(Debug)]
pub struct CaptureInterface {
    name: String,
    packet_capture: bool,
    gateway_edition: bool,
    dropped_alerts: AtomicU64,
}

impl CaptureInterface {
    pub fn new(name: impl Into<String>, packet_capture: bool, gateway_edition: bool) -> Self {
        Self {
            name: name.into(),
            packet_capture,
            gateway_edition,
            dropped_alerts: AtomicU64::new(0),
        }
    }

    /// Packet capture interface on a non-gateway engine
    pub fn packet(name: impl Into<String>) -> Self {
        Self::new(name, true, false)
    }

    pub fn dropped_alerts(&self) -> u64 {
        self.dropped_alerts.load(Ordering::Relaxed)
    }
}

impl NetworkInterface for CaptureInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_packet_capture(&self) -> bool {
        self.packet_capture
    }

    fn is_gateway_edition(&self) -> bool {
        self.gateway_edition
    }

    fn inc_dropped_alerts(&self, n: u64) {
        self.dropped_alerts.fetch_add(n, Ordering::Relaxed);
    }
}
