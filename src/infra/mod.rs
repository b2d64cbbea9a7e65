//! Infrastructure adapters for job storage, telemetry, and event delivery.

pub mod events;
pub mod repository;
pub mod telemetry;

pub use events::ChannelEventSink;
pub use repository::InMemoryJobRepository;
pub use telemetry::{ScriptedTelemetry, StaticTelemetry};
