//! Event Bus - in-process pub/sub for telemetry events
//!
//! The EventBus uses a tokio broadcast channel to fan events out to every
//! subscriber. The controller and the replay engine only see it through the
//! [`TelemetrySink`] trait.

use tokio::sync::broadcast;
use tracing::{debug, info};

use super::types::TelemetryEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Receiver of structured telemetry events
///
/// Emission is fire-and-forget and must not block: the controller calls it
/// on the resolution path.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Broadcast bus for telemetry events
pub struct EventBus {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Subscribe to receive events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl TelemetrySink for EventBus {
    fn emit(&self, event: TelemetryEvent) {
        debug!(event_type = event.event_type(), subject = event.subject(), "EventBus::emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that writes events to the `tracing` log and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::FallbackStage {
                stage,
                name,
                version,
                label,
                latency_ms,
                succeeded,
                error,
            } => {
                info!(
                    stage = stage.as_str(),
                    %name,
                    version = ?version,
                    label = ?label,
                    latency_ms,
                    succeeded,
                    error = ?error,
                    "fallback stage"
                );
            }
            TelemetryEvent::ReplaySummary {
                trace_id,
                status,
                token_delta,
            } => {
                info!(%trace_id, status = status.as_str(), token_delta, "replay summary");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReplayStatus;

    fn summary(trace_id: &str) -> TelemetryEvent {
        TelemetryEvent::ReplaySummary {
            trace_id: trace_id.to_string(),
            status: ReplayStatus::Ok,
            token_delta: 0,
        }
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = EventBus::with_default_capacity();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(summary("t-1"));

        assert_eq!(rx1.recv().await.unwrap(), summary("t-1"));
        assert_eq!(rx2.recv().await.unwrap(), summary("t-1"));
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        bus.emit(summary("t-1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_tracing_and_null_sinks_accept_events() {
        TracingSink.emit(summary("t-1"));
        NullSink.emit(summary("t-1"));
    }
}
