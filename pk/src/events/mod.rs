//! Telemetry events
//!
//! The fallback controller and the replay engine report what they did as
//! [`TelemetryEvent`]s handed to a [`TelemetrySink`]. Neither carries any
//! transport logic; the sink decides where events go.
//!
//! ```text
//!  FallbackController        ReplayEngine
//!   FallbackStage             ReplaySummary
//!         \                      /
//!          +--> TelemetrySink <-+
//!                |        |
//!            EventBus  TracingSink  NullSink
//!                |
//!           EventLogger (.jsonl)
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, NullSink, TelemetrySink, TracingSink};
pub use logger::{EventLogger, read_events, spawn_event_logger};
pub use types::{EventLogEntry, ReplayStatus, TelemetryEvent};
