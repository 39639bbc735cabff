//! Session engine: connection lifecycle, rooms, messaging, and events.

mod config;
mod engine;
mod events;
mod latency;
mod limits;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use engine::{SessionEngine, SessionPhase};
pub use events::{NullEvents, SessionEvents};
pub use latency::LatencyTracker;
pub use limits::{normalize_room, NegotiatedLimits};
