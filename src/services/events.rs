//! Event system for Manifest operations
//!
//! Listeners hear about saved Manifests, reconciled canvas paintings and
//! completed ingests. Typical uses are audit logging and cache invalidation.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Events emitted by the Manifest service
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestEvent {
    ManifestCreated {
        customer_id: i32,
        manifest_id: String,
    },
    ManifestUpdated {
        customer_id: i32,
        manifest_id: String,
    },
    ManifestDeleted {
        customer_id: i32,
        manifest_id: String,
    },

    /// Canvas painting rows were written for a Manifest
    CanvasPaintingsReconciled {
        customer_id: i32,
        manifest_id: String,
        inserted: usize,
        updated: usize,
        deleted: usize,
        ingesting: bool,
    },

    /// Asset processing finished and the Manifest was published
    IngestCompleted {
        customer_id: i32,
        manifest_id: String,
        attempts: u32,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ManifestEvent);
}

/// Event bus for broadcasting Manifest events
pub struct EventBus {
    sender: broadcast::Sender<ManifestEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ManifestEvent) {
        trace!(event = ?event, "Emitting manifest event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManifestEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &ManifestEvent) {
        match event {
            ManifestEvent::ManifestCreated { customer_id, manifest_id } => {
                info!(customer_id, manifest_id = %manifest_id, "Manifest created");
            }
            ManifestEvent::ManifestDeleted { customer_id, manifest_id } => {
                info!(customer_id, manifest_id = %manifest_id, "Manifest deleted");
            }
            ManifestEvent::CanvasPaintingsReconciled {
                manifest_id,
                inserted,
                updated,
                deleted,
                ingesting,
                ..
            } => {
                debug!(
                    manifest_id = %manifest_id,
                    inserted,
                    updated,
                    deleted,
                    ingesting,
                    "Canvas paintings reconciled"
                );
            }
            _ => {
                trace!(event = ?event, "Manifest event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(ManifestEvent::IngestCompleted {
            customer_id: 1,
            manifest_id: "m1".into(),
            attempts: 1,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            ManifestEvent::IngestCompleted { manifest_id, attempts, .. } => {
                assert_eq!(manifest_id, "m1");
                assert_eq!(attempts, 1);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(ManifestEvent::ManifestDeleted {
            customer_id: 1,
            manifest_id: "m1".into(),
        });
    }

    #[tokio::test]
    async fn test_logging_listener_stops_once_bus_is_dropped() {
        let bus = Arc::new(EventBus::new());
        let listener = spawn_logging_listener(bus.clone());
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(ManifestEvent::ManifestDeleted {
            customer_id: 1,
            manifest_id: "m1".into(),
        });
        drop(bus);

        timeout(Duration::from_millis(500), listener)
            .await
            .expect("listener did not stop")
            .expect("listener panicked");
    }
}
