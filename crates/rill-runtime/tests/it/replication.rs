use std::sync::Arc;
use std::time::Duration;

use rill_runtime::dst::DstClock;
use rill_runtime::SchedulerBuilder;

use crate::{start_time, wait_until, CountingReplication, RecordingManager, TestScheduler};

#[tokio::test]
async fn replication_runs_on_its_interval() {
    let manager = RecordingManager::new();
    let replication = CountingReplication::new();

    let clock = Arc::new(DstClock::new(start_time()));
    let scheduler = SchedulerBuilder::new(manager.clone())
        .replication(replication.clone())
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);

    runtime.settle().await;
    assert_eq!(replication.calls(), 0);

    clock.advance(Duration::from_secs(2));
    wait_until("first replication pass", || replication.calls() == 1).await;

    clock.advance(Duration::from_secs(2));
    wait_until("second replication pass", || replication.calls() == 2).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn replication_failures_do_not_stop_the_loop() {
    let manager = RecordingManager::new();
    let replication = CountingReplication::new();
    replication.fail_every_pass();

    let clock = Arc::new(DstClock::new(start_time()));
    let scheduler = SchedulerBuilder::new(manager.clone())
        .replication(replication.clone())
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);

    clock.advance(Duration::from_secs(2));
    wait_until("failing pass still ran", || replication.calls() == 1).await;

    // The failure was logged, the task re-armed, and the scheduler is
    // still healthy enough to run the next pass and shut down cleanly.
    clock.advance(Duration::from_secs(2));
    wait_until("loop survived the failure", || replication.calls() == 2).await;

    runtime.shutdown().await.unwrap();
}
