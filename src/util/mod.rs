//! Shared utilities.

/// Wall-clock helpers.
pub mod clock;
/// Shared identifiers and value types.
pub mod serde;
/// Tracing subscriber setup.
pub mod telemetry;

pub use self::clock::*;
pub use self::serde::*;
pub use self::telemetry::*;
