//! Built-in flow callbacks and their registration table.

use crate::callback::FlowCallback;

/// Trait items every callback spells out the same way: identity,
/// capabilities and access to the embedded [`CallbackState`].
///
/// [`CallbackState`]: crate::callback::CallbackState
macro_rules! callback_identity {
    ($name:literal, $category:expr, $status:expr, $caps:expr $(,)?) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn category(&self) -> $crate::types::ScriptCategory {
            $category
        }

        fn status(&self) -> $crate::types::FlowStatus {
            $status
        }

        fn capabilities(&self) -> $crate::callback::Capabilities {
            $caps
        }

        fn state(&self) -> &$crate::callback::CallbackState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut $crate::callback::CallbackState {
            &mut self.state
        }
    };
}

pub mod exfiltration;
pub mod network;
pub mod security;
pub mod tls;

#[cfg(test)]
pub(crate) mod testing;

pub use exfiltration::{DataExfiltration, DnsDataExfiltration};
pub use network::{LowGoodputFlow, TcpIssues, TcpZeroWindow, UdpUnidirectional};
pub use security::{
    BlacklistedFlow, DeviceProtocolNotAllowed, ExternalAlertCheck, FlowRisk, NedgeBlockedFlow,
    RemoteToLocalInsecureProto, RemoteToRemote,
};
pub use tls::{TlsCertificateExpired, TlsCertificateMismatch, TlsOldProtocolVersion, TlsUnsafeCiphers};

/// Constructor of one callback instance
pub type CallbackFactory = fn() -> Box<dyn FlowCallback>;

fn boxed<C: FlowCallback + Default + 'static>() -> Box<dyn FlowCallback> {
    Box::new(C::default())
}

/// Every callback known to the engine
pub const BUILTIN_CALLBACKS: &[CallbackFactory] = &[
    boxed::<BlacklistedFlow>,
    boxed::<ExternalAlertCheck>,
    boxed::<LowGoodputFlow>,
    boxed::<TlsCertificateMismatch>,
    boxed::<DnsDataExfiltration>,
    boxed::<DataExfiltration>,
    boxed::<DeviceProtocolNotAllowed>,
    boxed::<FlowRisk>,
    boxed::<RemoteToRemote>,
    boxed::<RemoteToLocalInsecureProto>,
    boxed::<TlsCertificateExpired>,
    boxed::<TlsOldProtocolVersion>,
    boxed::<TlsUnsafeCiphers>,
    boxed::<TcpZeroWindow>,
    boxed::<TcpIssues>,
    boxed::<UdpUnidirectional>,
    boxed::<NedgeBlockedFlow>,
];
