//! Tests for event sinks and event serialization

use prometheus_job_scheduler::core::{EventSink, ResourceState, SchedulerEvent};
use prometheus_job_scheduler::infra::ChannelEventSink;
use prometheus_job_scheduler::util::Priority;

#[test]
fn test_event_wire_format() {
    let event = SchedulerEvent::JobCreated {
        job_id: uuid::Uuid::nil(),
        work_item_id: "IMG_0042.CR3".into(),
        priority: Priority::new(8),
        at_ms: 1_700_000_000_000,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "job_created");
    assert_eq!(json["priority"], 8);
    assert_eq!(json["work_item_id"], "IMG_0042.CR3");

    let change = SchedulerEvent::ResourceStateChanged {
        device_id: "gpu0".into(),
        from: ResourceState::Normal,
        to: ResourceState::Throttled,
        throttle_multiplier: 0.5,
        at_ms: 0,
    };
    let json = serde_json::to_value(&change).unwrap();
    assert_eq!(json["type"], "resource_state_changed");
    assert_eq!(json["to"], "THROTTLED");
    assert!(change.job_id().is_none());
}

#[test]
fn test_channel_sink_forwards_in_order() {
    let (sink, rx) = ChannelEventSink::bounded(4);
    let ids: Vec<_> = (0..3).map(|_| uuid::Uuid::new_v4()).collect();
    for (i, id) in ids.iter().enumerate() {
        sink.publish(SchedulerEvent::JobCancelled {
            job_id: *id,
            at_ms: i as u128,
        });
    }
    let received: Vec<_> = rx.try_iter().filter_map(|e| e.job_id()).collect();
    assert_eq!(received, ids);
}

#[test]
fn test_channel_sink_survives_dropped_receiver() {
    let (sink, rx) = ChannelEventSink::bounded(1);
    drop(rx);
    sink.publish(SchedulerEvent::JobCancelled {
        job_id: uuid::Uuid::new_v4(),
        at_ms: 0,
    });
}
