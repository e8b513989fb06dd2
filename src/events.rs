//! Event distribution
//!
//! Repository events fan out synchronously to every registered listener.
//! The distributor treats event payloads as opaque; its one job is failure
//! isolation: a listener that errors or panics is logged and skipped, and
//! every other listener still sees the event.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// An event as carried between repositories. The payload is opaque JSON;
/// listeners decode what they understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub protocol_version: String,
    pub timestamp: DateTime<Utc>,
    /// Metadata collection id of the repository that produced the event
    pub originator_metadata_collection_id: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(
        originator_metadata_collection_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            protocol_version: "1.0".to_string(),
            timestamp: Utc::now(),
            originator_metadata_collection_id: originator_metadata_collection_id.into(),
            payload,
        }
    }
}

/// Receives repository events. Implementations must tolerate events they
/// do not understand and must not assume delivery order across sources.
pub trait EventListener: Send + Sync {
    /// A human-readable name used in failure logs
    fn name(&self) -> &str;

    fn process_event(&self, event: &EventEnvelope) -> anyhow::Result<()>;
}

/// Synchronous fan-out of events to registered listeners
#[derive(Default)]
pub struct EventDistributor {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is append-only; listeners cannot be removed once added
    pub fn register_listener(&mut self, listener: Box<dyn EventListener>) {
        debug!(listener = listener.name(), "event listener registered");
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver `event` to every listener in registration order. A failing
    /// or panicking listener never prevents delivery to the rest.
    pub fn distribute_event(&self, event: &EventEnvelope) {
        for listener in &self.listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.process_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        listener = listener.name(),
                        originator = %event.originator_metadata_collection_id,
                        error = %err,
                        "event listener returned an error"
                    );
                }
                Err(_) => {
                    error!(
                        listener = listener.name(),
                        originator = %event.originator_metadata_collection_id,
                        "event listener panicked"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingListener {
        name: String,
        seen: Arc<AtomicUsize>,
    }

    impl EventListener for CountingListener {
        fn name(&self) -> &str {
            &self.name
        }

        fn process_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingListener;

    impl EventListener for FailingListener {
        fn name(&self) -> &str {
            "failing"
        }

        fn process_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
            anyhow::bail!("listener is unhealthy")
        }
    }

    struct PanickingListener;

    impl EventListener for PanickingListener {
        fn name(&self) -> &str {
            "panicking"
        }

        fn process_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
            panic!("listener blew up")
        }
    }

    #[test]
    fn test_every_listener_sees_every_event() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut distributor = EventDistributor::new();
        for i in 0..3 {
            distributor.register_listener(Box::new(CountingListener {
                name: format!("listener-{i}"),
                seen: Arc::clone(&seen),
            }));
        }

        let event = EventEnvelope::new("peer-mcid", serde_json::json!({"kind": "typedef_added"}));
        distributor.distribute_event(&event);
        distributor.distribute_event(&event);
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_failures_and_panics_are_isolated() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut distributor = EventDistributor::new();
        distributor.register_listener(Box::new(FailingListener));
        distributor.register_listener(Box::new(PanickingListener));
        distributor.register_listener(Box::new(CountingListener {
            name: "survivor".to_string(),
            seen: Arc::clone(&seen),
        }));

        let event = EventEnvelope::new("peer-mcid", serde_json::json!({}));
        distributor.distribute_event(&event);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
