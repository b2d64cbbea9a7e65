//! Event sinks backed by external transports.

pub mod channel;

pub use channel::ChannelEventSink;
