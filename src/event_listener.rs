//! Event Listener - flow lifecycle event intake
//!
//! Events arrive over a bounded channel, either injected by the capture
//! engine or replayed from a JSON-lines recording.

use crate::flow::FlowInfo;
use crate::types::EventKind;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Lifecycle event for one flow, carrying its latest statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub flow_id: u64,
    pub kind: EventKind,
    #[serde(default)]
    pub info: FlowInfo,
}

/// Event listener configuration
#[derive(Debug, Clone)]
pub struct EventListenerConfig {
    /// Channel buffer size
    pub buffer_size: usize,
}

impl Default for EventListenerConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// Producer side of the flow event channel
#[derive(Debug, Clone)]
pub struct EventListener {
    event_tx: mpsc::Sender<FlowEvent>,
}

impl EventListener {
    /// Create new event listener
    pub fn new(config: EventListenerConfig) -> (Self, mpsc::Receiver<FlowEvent>) {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        (Self { event_tx: tx }, rx)
    }

    /// Queue one event, waiting for room in the channel
    pub async fn inject_event(&self, event: FlowEvent) -> Result<(), EventListenerError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| EventListenerError::ChannelClosed)
    }

    /// Replay a JSON-lines recording. Blank lines are ignored and malformed
    /// ones skipped with a warning. Returns the number of events queued.
    pub async fn replay<R>(&self, reader: R) -> Result<usize, EventListenerError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let mut queued = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<FlowEvent>(line) {
                Ok(event) => {
                    self.inject_event(event).await?;
                    queued += 1;
                }
                Err(e) => warn!("Skipping malformed event on line {}: {}", line_no, e),
            }
        }

        info!("🎧 Replayed {} flow events", queued);
        Ok(queued)
    }
}

/// Event listener errors
#[derive(Debug, thiserror::Error)]
pub enum EventListenerError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Event source read failed: {0}")]
    Io(#[from] std::io::Error),
}
