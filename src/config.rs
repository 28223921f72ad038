//! Daemon configuration, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings of the flow callbacks daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// JSON document loaded into the configuration store
    pub callbacks_config: Option<PathBuf>,
    /// JSON-lines flow event recording to replay
    pub events: Option<PathBuf>,
    pub iface_name: String,
    pub packet_capture: bool,
    pub gateway_edition: bool,
    /// Slots per priority lane of the alert queue
    pub alert_queue_capacity: usize,
    pub alert_store_capacity: usize,
    pub event_buffer_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            callbacks_config: None,
            events: None,
            iface_name: "eth0".to_string(),
            packet_capture: true,
            gateway_edition: false,
            alert_queue_capacity: 1024,
            alert_store_capacity: 1000,
            event_buffer_size: 1000,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("FLOW_CALLBACKS_CONFIG") {
            config.callbacks_config = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("FLOW_EVENTS") {
            config.events = Some(PathBuf::from(path));
        }
        if let Some(name) = lookup("FLOW_IFACE_NAME") {
            config.iface_name = name;
        }

        parse_into(&lookup, "FLOW_IFACE_PACKET_CAPTURE", &mut config.packet_capture)?;
        parse_into(&lookup, "FLOW_GATEWAY_EDITION", &mut config.gateway_edition)?;
        parse_into(&lookup, "ALERT_QUEUE_CAPACITY", &mut config.alert_queue_capacity)?;
        parse_into(&lookup, "ALERT_STORE_CAPACITY", &mut config.alert_store_capacity)?;
        parse_into(&lookup, "FLOW_EVENT_BUFFER", &mut config.event_buffer_size)?;

        Ok(config)
    }
}

fn parse_into<F, T>(lookup: &F, key: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("FLOW_CALLBACKS_CONFIG", "/etc/flow/callbacks.json"),
            ("FLOW_IFACE_NAME", "br0"),
            ("FLOW_GATEWAY_EDITION", "true"),
            ("ALERT_QUEUE_CAPACITY", " 16 "),
        ]))
        .unwrap();

        assert_eq!(config.callbacks_config, Some(PathBuf::from("/etc/flow/callbacks.json")));
        assert_eq!(config.iface_name, "br0");
        assert!(config.gateway_edition);
        assert_eq!(config.alert_queue_capacity, 16);
    }

    #[test]
    fn test_invalid_value() {
        let err = AgentConfig::from_lookup(lookup(&[("ALERT_STORE_CAPACITY", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "ALERT_STORE_CAPACITY",
                value: "lots".into()
            }
        );
    }
}
