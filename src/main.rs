//! Flow Callbacks Daemon
//!
//! Replays flow lifecycle events through the callback registry and keeps
//! the resulting alerts in the builtin store.

use flow_callbacks::{
    AgentConfig, AlertLevel, AlertQueue, AlertStore, CaptureInterface, EventKind, EventListener,
    EventListenerConfig, FlowAlerter, FlowCallbacksLoader, FlowEvent, FlowInfo, FlowRecord,
    MemoryConfigStore, NetworkInterface, BUILTIN_RECIPIENT, FLOW_CALLBACKS_CONFIG,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🛡️  Flow callbacks agent starting...");

    let config = AgentConfig::from_env()?;

    // Configuration store, seeded from the persisted document if any
    let store = MemoryConfigStore::new();
    if let Some(path) = &config.callbacks_config {
        match tokio::fs::read_to_string(path).await {
            Ok(doc) => store.insert(FLOW_CALLBACKS_CONFIG, doc),
            Err(e) => warn!("Unable to read {}: {}", path.display(), e),
        }
    }

    let loader = FlowCallbacksLoader::new(&store)?;
    loader.list_callbacks();
    info!("✅ {} of {} callbacks enabled", loader.enabled_count(), loader.len());

    let capture = Arc::new(CaptureInterface::new(
        config.iface_name.clone(),
        config.packet_capture,
        config.gateway_edition,
    ));
    let iface: Arc<dyn NetworkInterface> = capture.clone();

    let (queue, mut alert_rx) = AlertQueue::new(BUILTIN_RECIPIENT, config.alert_queue_capacity);
    let alerter = FlowAlerter::new(Arc::new(queue));
    let alert_store = Arc::new(AlertStore::with_capacity(config.alert_store_capacity));
    info!("✅ Alert queue initialized");

    let (listener, mut event_rx) = EventListener::new(EventListenerConfig {
        buffer_size: config.event_buffer_size,
    });

    // Builtin recipient
    let store_clone = alert_store.clone();
    let consumer_handle = tokio::spawn(async move {
        while let Some(notification) = alert_rx.recv().await {
            store_clone.store(notification);
        }
    });

    // Event intake
    let events = config.events.clone();
    let listener_handle = tokio::spawn(async move {
        match events {
            Some(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => {
                    if let Err(e) = listener.replay(BufReader::new(file)).await {
                        error!("Event replay error: {}", e);
                    }
                }
                Err(e) => error!("Unable to open {}: {}", path.display(), e),
            },
            None => {
                info!("🎧 No event recording configured, waiting for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    });

    info!("🚀 Flow callbacks agent running on {}", iface.name());

    let mut flows: HashMap<u64, FlowRecord> = HashMap::new();
    let mut stats = EventStats::default();

    // Main event loop
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    info!("Event source exhausted");
                    break;
                };
                stats.events += 1;
                stats.callback_runs += handle_event(&loader, &iface, &alerter, &mut flows, event);
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    // Cleanup: dropping the alerter closes the queue so the consumer drains
    listener_handle.abort();
    drop(alerter);
    if let Err(e) = consumer_handle.await {
        warn!("Alert consumer ended abnormally: {}", e);
    }

    info!(
        "📊 Events={}, callback runs={}, open flows={}",
        stats.events,
        stats.callback_runs,
        flows.len()
    );
    info!(
        "📊 Alert stats: stored={}, replaced={}, error+={}, dropped={}",
        alert_store.total_count(),
        alert_store.replacements(),
        alert_store.alerts_at_least(AlertLevel::Error).len(),
        capture.dropped_alerts()
    );

    info!("Flow callbacks agent stopped");

    Ok(())
}

#[derive(Debug, Default)]
struct EventStats {
    events: u64,
    callback_runs: usize,
}

/// Apply one event to the flow table and run the matching callbacks
fn handle_event(
    loader: &FlowCallbacksLoader,
    iface: &Arc<dyn NetworkInterface>,
    alerter: &FlowAlerter,
    flows: &mut HashMap<u64, FlowRecord>,
    event: FlowEvent,
) -> usize {
    let FlowEvent { flow_id, kind, info } = event;

    let flow = flows
        .entry(flow_id)
        .or_insert_with(|| FlowRecord::new(flow_id, FlowInfo::default(), Some(iface.clone())));
    flow.update_info(info);

    let ran = loader.dispatch(iface.as_ref(), kind, flow, alerter);

    if kind == EventKind::FlowEnd {
        flows.remove(&flow_id);
    }

    ran
}
