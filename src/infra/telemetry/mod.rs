//! Telemetry sources that do not talk to hardware.

pub mod scripted;
pub mod fixed;

pub use fixed::StaticTelemetry;
pub use scripted::ScriptedTelemetry;
