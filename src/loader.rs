//! Flow callbacks registry.
//!
//! Owns one instance of every known callback, applies the persisted
//! configuration once at construction and builds dispatch lists per event.

use crate::alert_trigger::FlowAlerter;
use crate::callback::FlowCallback;
use crate::callbacks::{CallbackFactory, BUILTIN_CALLBACKS};
use crate::config_store::{ConfigStore, FLOW_CALLBACKS_CONFIG};
use crate::flow::Flow;
use crate::interface::NetworkInterface;
use crate::types::EventKind;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info, warn};

/// Registry construction errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Duplicate flow callback name: {0}")]
    DuplicateCallback(String),
}

/// Why the configuration document was not applied
#[derive(Error, Debug)]
enum ConfigLoadError {
    #[error("Unable to allocate memory to deserialize {0}")]
    Allocation(&'static str),

    #[error("Unable to find configuration {key}: {source}")]
    Store {
        key: &'static str,
        source: crate::config_store::StoreError,
    },

    #[error("JSON parse error [{0}] [len: {1}]")]
    Parse(serde_json::Error, usize),

    #[error("'{0}' not found in JSON")]
    MissingSection(&'static str),
}

/// Registry of all flow callbacks, keyed and iterated by name
pub struct FlowCallbacksLoader {
    callbacks: BTreeMap<&'static str, Box<dyn FlowCallback>>,
}

impl FlowCallbacksLoader {
    /// Register the built-in callbacks and apply the stored configuration
    pub fn new(store: &dyn ConfigStore) -> Result<Self, LoaderError> {
        Self::with_factories(BUILTIN_CALLBACKS, store)
    }

    pub fn with_factories(
        factories: &[CallbackFactory],
        store: &dyn ConfigStore,
    ) -> Result<Self, LoaderError> {
        let mut loader = Self::register_all(factories)?;
        loader.load_configuration(store);
        Ok(loader)
    }

    /// Instantiate every factory. Duplicate names are rejected.
    pub fn register_all(factories: &[CallbackFactory]) -> Result<Self, LoaderError> {
        let mut callbacks = BTreeMap::new();

        for factory in factories {
            let cb = factory();
            let name = cb.name();
            if callbacks.insert(name, cb).is_some() {
                return Err(LoaderError::DuplicateCallback(name.to_string()));
            }
        }

        Ok(Self { callbacks })
    }

    /// Apply the persisted configuration document.
    ///
    /// Any problem reading or parsing the document is logged and leaves
    /// every callback as it was.
    pub fn load_configuration(&mut self, store: &dyn ConfigStore) {
        match read_flow_section(store) {
            Ok(flow) => self.apply_flow_section(&flow),
            Err(e) => error!("{}", e),
        }
    }

    fn apply_flow_section(&mut self, flow: &serde_json::Map<String, Value>) {
        for (key, callback_config) in flow {
            // Unknown names are reported whether or not the entry is enabled
            let Some(cb) = self.callbacks.get_mut(key.as_str()) else {
                warn!("Unable to find flow callback {}", key);
                continue;
            };

            let Some(all) = callback_config.get("all") else {
                continue;
            };
            let enabled = all.get("enabled").and_then(Value::as_bool).unwrap_or(false);
            if !enabled {
                continue;
            }
            let Some(script_conf) = all.get("script_conf") else {
                continue;
            };

            if cb.load_configuration(script_conf) {
                info!("Successfully loaded configuration for callback {}", key);
            } else {
                warn!("Error while loading callback {} configuration", key);
            }

            cb.enable();
        }
    }

    /// Enabled callbacks subscribed to `kind` and compatible with `iface`,
    /// in name order. A new list is built on every call.
    pub fn get_callbacks(&self, iface: &dyn NetworkInterface, kind: EventKind) -> Vec<&dyn FlowCallback> {
        let mut list = Vec::new();

        for cb in self.callbacks.values() {
            if cb.is_enabled() {
                cb.register_for_event(&mut list, iface, kind);
            }
        }

        list
    }

    /// Run every matching callback on `flow`. Returns how many ran.
    pub fn dispatch(
        &self,
        iface: &dyn NetworkInterface,
        kind: EventKind,
        flow: &mut dyn Flow,
        alerter: &FlowAlerter,
    ) -> usize {
        let callbacks = self.get_callbacks(iface, kind);
        for cb in &callbacks {
            cb.handle(kind, flow, alerter);
        }
        callbacks.len()
    }

    /// Log the names of all registered callbacks
    pub fn list_callbacks(&self) -> Vec<&'static str> {
        info!("Available Callbacks:");
        for name in self.callbacks.keys() {
            info!("\t{}", name);
        }
        self.callbacks.keys().copied().collect()
    }

    pub fn callback(&self, name: &str) -> Option<&dyn FlowCallback> {
        self.callbacks.get(name).map(|cb| cb.as_ref())
    }

    pub fn callback_mut(&mut self, name: &str) -> Option<&mut (dyn FlowCallback + 'static)> {
        self.callbacks.get_mut(name).map(|cb| cb.as_mut())
    }

    pub fn enabled_count(&self) -> usize {
        self.callbacks.values().filter(|cb| cb.is_enabled()).count()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

fn read_flow_section(store: &dyn ConfigStore) -> Result<serde_json::Map<String, Value>, ConfigLoadError> {
    let len = store.len(FLOW_CALLBACKS_CONFIG);

    let mut value = String::new();
    value
        .try_reserve_exact(len + 1)
        .map_err(|_| ConfigLoadError::Allocation(FLOW_CALLBACKS_CONFIG))?;

    store
        .get(FLOW_CALLBACKS_CONFIG, &mut value)
        .map_err(|source| ConfigLoadError::Store {
            key: FLOW_CALLBACKS_CONFIG,
            source,
        })?;

    let json: Value = serde_json::from_str(&value).map_err(|e| ConfigLoadError::Parse(e, len))?;

    let mut config = match json {
        Value::Object(mut root) => root
            .remove("config")
            .ok_or(ConfigLoadError::MissingSection("config"))?,
        _ => return Err(ConfigLoadError::MissingSection("config")),
    };

    match config.get_mut("flow").map(Value::take) {
        Some(Value::Object(flow)) => Ok(flow),
        _ => Err(ConfigLoadError::MissingSection("flow")),
    }
}
