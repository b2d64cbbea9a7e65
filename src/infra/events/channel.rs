//! Bounded channel event sink.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::core::events::{EventSink, SchedulerEvent};

/// Forwards events to a bounded `crossbeam-channel`. Events are dropped when
/// the consumer falls behind.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: Sender<SchedulerEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<SchedulerEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: SchedulerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(action = event.action(), "event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_when_full() {
        let (sink, rx) = ChannelEventSink::bounded(1);
        for n in 0..3 {
            sink.publish(SchedulerEvent::JobCancelled {
                job_id: uuid::Uuid::new_v4(),
                at_ms: n,
            });
        }
        assert_eq!(rx.len(), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SchedulerEvent::JobCancelled { at_ms: 0, .. }
        ));
    }
}
