//! ZoneMonitor task lifecycle and stop policies

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use vcap_core::{rect_to_coords, DetectionNode};
use vcap_zones::{
    Comparator, CountCondition, FrameSnapshot, StopPolicy, Zone, ZoneAlarm, ZoneEvaluator,
    ZoneMonitor,
};

fn evaluator() -> ZoneEvaluator {
    let zone = Zone::new("dock", rect_to_coords([0.0, 0.0, 100.0, 100.0])).with_alarm(
        ZoneAlarm::new("occupied")
            .with_count(CountCondition::new(Comparator::GreaterThan, 0.0).with_class_name("truck")),
    );
    ZoneEvaluator::new(vec![zone]).unwrap()
}

fn snapshot(t: f64, trucks: usize) -> FrameSnapshot {
    let truck = DetectionNode::new("truck", rect_to_coords([10.0, 10.0, 50.0, 50.0]));
    FrameSnapshot::new(t, vec![truck; trucks])
}

#[tokio::test]
async fn test_flush_open_closes_with_last_timestamp() {
    let (tx, rx) = mpsc::channel(16);
    let (monitor, mut alerts) = ZoneMonitor::spawn(evaluator(), rx, StopPolicy::FlushOpen);

    for t in 0..4 {
        tx.send(snapshot(t as f64, 1)).await.unwrap();
    }
    drop(tx);

    let evaluator = monitor.join().await.unwrap();
    assert!(evaluator.open_alerts().is_empty());

    let opened = alerts.next().await.unwrap();
    let closed = alerts.next().await.unwrap();
    assert_eq!(opened.start_time, 0.0);
    assert_eq!(opened.end_time, None);
    assert_eq!(closed.alert_id, opened.alert_id);
    assert_eq!(closed.end_time, Some(3.0));
    // the task has finished, so the stream ends
    assert!(alerts.next().await.is_none());
}

#[tokio::test]
async fn test_leave_open_allows_resumption() {
    let (tx, rx) = mpsc::channel(16);
    let (monitor, mut alerts) = ZoneMonitor::spawn(evaluator(), rx, StopPolicy::LeaveOpen);

    tx.send(snapshot(0.0, 1)).await.unwrap();
    tx.send(snapshot(1.0, 1)).await.unwrap();
    drop(tx);

    let mut evaluator = monitor.join().await.unwrap();
    assert_eq!(alerts.next().await.unwrap().end_time, None);
    assert!(alerts.next().await.is_none());
    assert_eq!(evaluator.open_alerts().len(), 1);

    // Resume on a new monitor: the same alert closes when the dock empties
    let (tx, rx) = mpsc::channel(16);
    let (monitor, mut alerts) = ZoneMonitor::spawn(evaluator, rx, StopPolicy::LeaveOpen);
    tx.send(snapshot(2.0, 0)).await.unwrap();
    drop(tx);

    evaluator = monitor.join().await.unwrap();
    let closed = alerts.next().await.unwrap();
    assert_eq!(closed.alert_id, 1);
    assert_eq!(closed.duration(), Some(2.0));
    assert!(evaluator.open_alerts().is_empty());
}

#[tokio::test]
async fn test_stop_ends_monitor_while_sender_alive() {
    let (tx, rx) = mpsc::channel(16);
    let (monitor, mut alerts) = ZoneMonitor::spawn(evaluator(), rx, StopPolicy::FlushOpen);

    tx.send(snapshot(5.0, 1)).await.unwrap();
    // Wait until the snapshot has been evaluated before stopping
    let opened = alerts.next().await.unwrap();
    assert_eq!(opened.start_time, 5.0);

    let evaluator = monitor.stop().await.unwrap();
    assert_eq!(evaluator.last_timestamp(), Some(5.0));
    assert_eq!(alerts.next().await.unwrap().end_time, Some(5.0));
    drop(tx);
}

#[tokio::test]
async fn test_out_of_order_snapshot_is_skipped() {
    let (tx, rx) = mpsc::channel(16);
    let (monitor, _alerts) = ZoneMonitor::spawn(evaluator(), rx, StopPolicy::LeaveOpen);

    tx.send(snapshot(10.0, 0)).await.unwrap();
    tx.send(snapshot(4.0, 1)).await.unwrap();
    tx.send(snapshot(11.0, 0)).await.unwrap();
    drop(tx);

    let evaluator = monitor.join().await.unwrap();
    assert_eq!(evaluator.last_timestamp(), Some(11.0));
    assert!(evaluator.open_alerts().is_empty());
}
