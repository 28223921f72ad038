use flow_callbacks::{
    AlertLevel, AlertNotification, AlertQueue, AlertStore, CallbackFactory, CallbackState,
    Capabilities, CaptureInterface, ConfigStore, EventKind, Flow, FlowAlerter, FlowCallback,
    FlowCallbacksLoader, FlowInfo, FlowRecord, FlowStatus, LoaderError, MemoryConfigStore,
    NetworkInterface, NotificationPriority, NotificationSink, RecipientId, ScriptCategory,
    BUILTIN_RECIPIENT, FLOW_CALLBACKS_CONFIG,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn store_with(doc: Value) -> MemoryConfigStore {
    let store = MemoryConfigStore::new();
    store.insert(FLOW_CALLBACKS_CONFIG, doc.to_string());
    store
}

fn enable_all(names: &[&str]) -> Value {
    let flow: serde_json::Map<String, Value> = names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                json!({"all": {"enabled": true, "script_conf": {"severity_id": 5}}}),
            )
        })
        .collect();
    json!({ "config": { "flow": flow } })
}

fn names(list: &[&dyn FlowCallback]) -> Vec<&'static str> {
    list.iter().map(|cb| cb.name()).collect()
}

struct RejectAll;

impl NotificationSink for RejectAll {
    fn enqueue(
        &self,
        _recipient: RecipientId,
        _priority: NotificationPriority,
        notification: AlertNotification,
    ) -> Result<(), AlertNotification> {
        Err(notification)
    }
}

/// Callback that subscribes to nothing but end of flow
#[derive(Default)]
struct EndOnly {
    state: CallbackState,
}

impl FlowCallback for EndOnly {
    fn name(&self) -> &'static str {
        "end_only"
    }
    fn category(&self) -> ScriptCategory {
        ScriptCategory::Internals
    }
    fn status(&self) -> FlowStatus {
        FlowStatus::Normal
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            flow_end: true,
            ..Capabilities::NONE
        }
    }
    fn state(&self) -> &CallbackState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut CallbackState {
        &mut self.state
    }
}

fn end_only() -> Box<dyn FlowCallback> {
    Box::new(EndOnly::default())
}

#[test]
fn test_duplicate_registration_fails_construction() {
    let factories: &[CallbackFactory] = &[end_only, end_only];
    let result = FlowCallbacksLoader::with_factories(factories, &MemoryConfigStore::new());
    assert_eq!(
        result.err(),
        Some(LoaderError::DuplicateCallback("end_only".to_string()))
    );
}

#[test]
fn test_protocol_detected_list_excludes_non_subscribers() {
    let store = store_with(json!({"config": {"flow": {
        "end_only": {"all": {"enabled": true, "script_conf": {}}}
    }}}));
    let loader = FlowCallbacksLoader::with_factories(&[end_only], &store).unwrap();
    let iface = CaptureInterface::packet("eth0");

    assert!(loader.callback("end_only").unwrap().is_enabled());
    assert!(loader.get_callbacks(&iface, EventKind::ProtocolDetected).is_empty());
    assert_eq!(names(&loader.get_callbacks(&iface, EventKind::FlowEnd)), vec!["end_only"]);
}

#[test]
fn test_nothing_dispatched_before_enable() {
    let loader = FlowCallbacksLoader::new(&MemoryConfigStore::new()).unwrap();
    let iface = CaptureInterface::new("br0", true, true);

    for kind in [EventKind::ProtocolDetected, EventKind::PeriodicUpdate, EventKind::FlowEnd] {
        assert!(loader.get_callbacks(&iface, kind).is_empty());
    }
}

#[test]
fn test_builtin_dispatch_lists() {
    let store = store_with(enable_all(&[
        "blacklisted",
        "flow_risk",
        "low_goodput",
        "tcp_zero_window",
        "udp_unidirectional",
        "remote_to_remote",
        "nedge_blocked",
    ]));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    assert_eq!(loader.enabled_count(), 7);

    let pcap = CaptureInterface::packet("eth0");
    assert_eq!(
        names(&loader.get_callbacks(&pcap, EventKind::ProtocolDetected)),
        vec!["blacklisted", "flow_risk", "remote_to_remote"]
    );
    assert_eq!(
        names(&loader.get_callbacks(&pcap, EventKind::PeriodicUpdate)),
        vec!["low_goodput", "tcp_zero_window"]
    );
    assert_eq!(
        names(&loader.get_callbacks(&pcap, EventKind::FlowEnd)),
        vec!["low_goodput", "tcp_zero_window", "udp_unidirectional"]
    );

    // Flow collector on the gateway edition: no packet-only callbacks,
    // nEdge-only ones included, nEdge-excluded ones dropped
    let gateway_collector = CaptureInterface::new("zmq", false, true);
    assert_eq!(
        names(&loader.get_callbacks(&gateway_collector, EventKind::ProtocolDetected)),
        vec!["blacklisted", "flow_risk", "nedge_blocked"]
    );
    assert_eq!(
        names(&loader.get_callbacks(&gateway_collector, EventKind::PeriodicUpdate)),
        vec!["low_goodput"]
    );
}

#[test]
fn test_severity_loaded_and_clamped() {
    let store = store_with(json!({"config": {"flow": {
        "flow_risk": {"all": {"enabled": true, "script_conf": {"severity_id": 2}}},
        "blacklisted": {"all": {"enabled": true, "script_conf": {"severity_id": 250}}}
    }}}));
    let loader = FlowCallbacksLoader::new(&store).unwrap();

    let risk = loader.callback("flow_risk").unwrap();
    assert!(risk.is_enabled());
    assert_eq!(risk.severity().id(), 2);

    let blacklisted = loader.callback("blacklisted").unwrap();
    assert_eq!(blacklisted.severity(), AlertLevel::Emergency);
}

#[test]
fn test_missing_flow_section_leaves_all_disabled() {
    let store = store_with(json!({"config": {"host": {}}}));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    assert_eq!(loader.enabled_count(), 0);
    assert!(!loader.is_empty());
}

#[test]
fn test_store_miss_leaves_all_disabled() {
    let store = MemoryConfigStore::new();
    assert_eq!(store.len(FLOW_CALLBACKS_CONFIG), 0);
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    assert_eq!(loader.enabled_count(), 0);
}

#[test]
fn test_replace_marker_across_callbacks() {
    let store = store_with(enable_all(&["blacklisted", "flow_risk"]));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    let (queue, mut rx) = AlertQueue::new(BUILTIN_RECIPIENT, 8);
    let alerter = FlowAlerter::new(Arc::new(queue));
    let iface: Arc<dyn NetworkInterface> = Arc::new(CaptureInterface::packet("eth0"));

    let mut info = FlowInfo::default();
    info.risk_bitmap = 1 << 5;
    info.blacklist.client = true;
    let mut flow = FlowRecord::new(9, info, Some(iface.clone()));

    // Name order: blacklisted fires first (score 150), flow_risk second (50)
    let ran = loader.dispatch(iface.as_ref(), EventKind::ProtocolDetected, &mut flow, &alerter);
    assert_eq!(ran, 2);

    let first: Value = serde_json::from_str(&rx.try_recv().unwrap().alert_json).unwrap();
    assert!(first.get("replace_alert").is_none());
    assert_eq!(first["alerted_status"], FlowStatus::Blacklisted.id());

    // Lower score flow_risk is recorded on the flow but not re-alerted
    assert!(rx.try_recv().is_none());
    assert!(flow.has_status(FlowStatus::FlowRisk));
    assert!(flow.is_alerted());
}

#[test]
fn test_second_alert_carries_replace_marker() {
    let store = store_with(enable_all(&["flow_risk", "blacklisted"]));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    let (queue, mut rx) = AlertQueue::new(BUILTIN_RECIPIENT, 8);
    let alerter = FlowAlerter::new(Arc::new(queue));
    let iface: Arc<dyn NetworkInterface> = Arc::new(CaptureInterface::packet("eth0"));

    // Risk first, blacklist learnt later in the flow's life
    let mut info = FlowInfo::default();
    info.risk_bitmap = 1 << 5;
    let mut flow = FlowRecord::new(3, info, Some(iface.clone()));
    loader.dispatch(iface.as_ref(), EventKind::ProtocolDetected, &mut flow, &alerter);

    flow.info_mut().blacklist.server = true;
    loader.dispatch(iface.as_ref(), EventKind::ProtocolDetected, &mut flow, &alerter);

    let first: Value = serde_json::from_str(&rx.try_recv().unwrap().alert_json).unwrap();
    let second: Value = serde_json::from_str(&rx.try_recv().unwrap().alert_json).unwrap();
    assert!(first.get("replace_alert").is_none());
    assert_eq!(second["replace_alert"], true);
    assert_eq!(second["alerted_status"], FlowStatus::Blacklisted.id());
}

#[test]
fn test_rejecting_sink_counts_drops() {
    let store = store_with(enable_all(&["remote_to_remote"]));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    let alerter = FlowAlerter::new(Arc::new(RejectAll));
    let capture = Arc::new(CaptureInterface::packet("eth0"));
    let iface: Arc<dyn NetworkInterface> = capture.clone();

    for id in 0..5 {
        let mut flow = FlowRecord::new(id, FlowInfo::default(), Some(iface.clone()));
        loader.dispatch(iface.as_ref(), EventKind::ProtocolDetected, &mut flow, &alerter);
        assert_eq!(capture.dropped_alerts(), id + 1);

        // Same status again on the same flow is suppressed, not dropped
        loader.dispatch(iface.as_ref(), EventKind::ProtocolDetected, &mut flow, &alerter);
        assert_eq!(capture.dropped_alerts(), id + 1);
    }
}

#[test]
fn test_gateway_exclusion_independent_of_enabled() {
    let mut loader = FlowCallbacksLoader::new(&MemoryConfigStore::new()).unwrap();
    let gateway = CaptureInterface::new("br0", true, true);
    let plain = CaptureInterface::packet("eth0");

    for enabled in [false, true] {
        let cb = loader.callback_mut("remote_to_remote").unwrap();
        if enabled {
            cb.enable();
        }
        assert!(!cb.is_compatible_with_interface(&gateway));
        assert!(cb.is_compatible_with_interface(&plain));
    }
}

#[tokio::test]
async fn test_full_pipeline_into_alert_store() {
    let store = store_with(enable_all(&["tls_old_protocol_version", "dns_data_exfiltration"]));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    let (queue, mut rx) = AlertQueue::new(BUILTIN_RECIPIENT, 8);
    let alerter = FlowAlerter::new(Arc::new(queue));
    let iface: Arc<dyn NetworkInterface> = Arc::new(CaptureInterface::packet("eth0"));

    let mut tls = FlowRecord::new(
        1,
        serde_json::from_value(json!({
            "app_protocol": "TLS",
            "tls": {"version": 769}
        }))
        .unwrap(),
        Some(iface.clone()),
    );
    loader.dispatch(iface.as_ref(), EventKind::ProtocolDetected, &mut tls, &alerter);

    let mut dns = FlowRecord::new(
        2,
        serde_json::from_value(json!({
            "app_protocol": "DNS",
            "dns_query": "x".repeat(120)
        }))
        .unwrap(),
        Some(iface.clone()),
    );
    loader.dispatch(iface.as_ref(), EventKind::FlowEnd, &mut dns, &alerter);
    drop(alerter);

    let alerts = AlertStore::new();
    while let Some(notification) = rx.recv().await {
        alerts.store(notification);
    }

    assert_eq!(alerts.total_count(), 2);
    assert_eq!(alerts.count_by_severity(AlertLevel::Error), 2);
    let flows: Vec<_> = alerts
        .alerts_at_least(AlertLevel::Error)
        .iter()
        .filter_map(|a| a.flow_id())
        .collect();
    assert_eq!(flows, vec![1, 2]);
}

#[test]
fn test_saturated_counters_from_event_do_not_panic() {
    let store = store_with(enable_all(&["low_goodput", "tcp_issues"]));
    let loader = FlowCallbacksLoader::new(&store).unwrap();
    let (queue, mut rx) = AlertQueue::new(BUILTIN_RECIPIENT, 8);
    let alerter = FlowAlerter::new(Arc::new(queue));
    let iface: Arc<dyn NetworkInterface> = Arc::new(CaptureInterface::packet("eth0"));

    let event: flow_callbacks::FlowEvent = serde_json::from_value(json!({
        "flow_id": 11,
        "kind": "periodic_update",
        "info": {
            "protocol": 6,
            "cli2srv_packets": u64::MAX,
            "srv2cli_packets": 1,
            "cli2srv_bytes": u64::MAX,
            "srv2cli_bytes": 1
        }
    }))
    .unwrap();

    let mut flow = FlowRecord::new(event.flow_id, event.info, Some(iface.clone()));
    let ran = loader.dispatch(iface.as_ref(), event.kind, &mut flow, &alerter);
    assert_eq!(ran, 2);

    // No payload at all: low goodput fires, the TCP counters stay clean
    let record: Value = serde_json::from_str(&rx.try_recv().unwrap().alert_json).unwrap();
    assert_eq!(record["alerted_status"], FlowStatus::LowGoodput.id());
    assert!(rx.try_recv().is_none());
}
