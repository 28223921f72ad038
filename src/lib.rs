//! Flow Callbacks - per-flow behavior checks for traffic monitoring
//!
//! Registry, configuration and alert dispatch for the flow callbacks run by
//! the monitoring engine on every flow lifecycle event.

pub mod types;
pub mod interface;
pub mod flow;
pub mod config_store;
pub mod notification;
pub mod callback;
pub mod alert_trigger;
pub mod callbacks;
pub mod loader;
pub mod alert_store;
pub mod event_listener;
pub mod config;

pub use types::{AlertLevel, EventKind, FlowStatus, NotificationPriority, ScriptCategory};
pub use interface::{CaptureInterface, NetworkInterface};
pub use flow::{Flow, FlowAlert, FlowInfo, FlowRecord, FlowVerdict};
pub use config_store::{ConfigStore, MemoryConfigStore, StoreError, FLOW_CALLBACKS_CONFIG};
pub use notification::{
    AlertNotification, AlertQueue, AlertReceiver, NotificationSink, RecipientId, BUILTIN_RECIPIENT,
};
pub use callback::{Capabilities, CallbackState, FlowCallback};
pub use alert_trigger::{FlowAlerter, TriggerOutcome};
pub use callbacks::{CallbackFactory, BUILTIN_CALLBACKS};
pub use loader::{FlowCallbacksLoader, LoaderError};
pub use alert_store::{AlertStore, StoredAlert};
pub use event_listener::{EventListener, EventListenerConfig, EventListenerError, FlowEvent};
pub use config::{AgentConfig, ConfigError};
