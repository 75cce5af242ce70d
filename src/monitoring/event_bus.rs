use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::performance::DriftSeverity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnsembleEvent {
    ModelFailed {
        request_id: String,
        model_id: String,
        reason: String,
    },
    QuorumFallback {
        request_id: String,
        symbol: String,
        model_id: String,
        succeeded: usize,
        required: usize,
    },
    CacheUnavailable {
        key: String,
        reason: String,
    },
    DriftDetected {
        model_id: String,
        severity: DriftSeverity,
        concept_drift: f64,
        feature_drift: f64,
        timestamp: DateTime<Utc>,
    },
}

pub struct EventBus {
    sender: broadcast::Sender<EnsembleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishing with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: EnsembleEvent) {
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!("📡 Event published to {} receivers", receivers);
            }
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!("No subscribers for event {:?}", event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnsembleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
