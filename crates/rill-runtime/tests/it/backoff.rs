use std::sync::Arc;
use std::time::Duration;

use rill_runtime::dst::DstClock;
use rill_runtime::{Endpoint, SchedulerBuilder};

use crate::{start_time, wait_until, RecordingManager, TestEndpoint, TestScheduler};

#[tokio::test]
async fn nacked_endpoint_is_skipped_until_acked() {
    let manager = RecordingManager::new();
    let clock = Arc::new(DstClock::new(start_time()));
    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();

    let refused = TestEndpoint::with_pending(0);
    let healthy = TestEndpoint::with_pending(0);
    let runtime = TestScheduler::spawn(scheduler);
    runtime
        .handle
        .register_endpoint(&(refused.clone() as Arc<dyn Endpoint>));
    runtime
        .handle
        .register_endpoint(&(healthy.clone() as Arc<dyn Endpoint>));

    // The initial pass sweeps both endpoints.
    runtime.settle().await;
    assert_eq!((refused.attempts(), healthy.attempts()), (1, 1));

    // A refused send backs the endpoint off and schedules a pass at the
    // cooldown expiry, so nothing runs yet.
    runtime.handle.tunnel_tx_nack(refused.id());
    runtime.settle().await;
    assert_eq!((refused.attempts(), healthy.attempts()), (1, 1));

    // A pass during the cooldown must skip the backed-off endpoint.
    runtime.handle.platform_event(None);
    wait_until("healthy endpoint swept again", || healthy.attempts() == 2).await;
    assert_eq!(refused.attempts(), 1);

    // The ack clears the cooldown and forces another pass that reaches the
    // previously refused endpoint.
    runtime.handle.tunnel_tx_ack(refused.id());
    wait_until("refused endpoint swept after ack", || {
        refused.attempts() == 2
    })
    .await;
    assert_eq!(healthy.attempts(), 3);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn backoff_expiry_wakes_the_scheduler() {
    let manager = RecordingManager::new();
    let clock = Arc::new(DstClock::new(start_time()));
    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();

    let endpoint = TestEndpoint::with_pending(0);
    let runtime = TestScheduler::spawn(scheduler);
    runtime
        .handle
        .register_endpoint(&(endpoint.clone() as Arc<dyn Endpoint>));
    runtime.settle().await;
    assert_eq!(endpoint.attempts(), 1);

    runtime.handle.tunnel_tx_nack(endpoint.id());
    runtime.settle().await;

    // No ack arrives; the pass scheduled at the cooldown expiry picks the
    // endpoint up again on its own.
    clock.advance(Duration::from_millis(10));
    wait_until("endpoint retried after cooldown", || {
        endpoint.attempts() == 2
    })
    .await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn unregistered_endpoints_drop_out_of_the_sweep() {
    let manager = RecordingManager::new();
    let clock = Arc::new(DstClock::new(start_time()));
    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();

    let endpoint = TestEndpoint::with_pending(0);
    let runtime = TestScheduler::spawn(scheduler);
    runtime
        .handle
        .register_endpoint(&(endpoint.clone() as Arc<dyn Endpoint>));
    runtime.settle().await;
    assert_eq!(endpoint.attempts(), 1);

    runtime.handle.unregister_endpoint(endpoint.id());
    runtime.handle.platform_event(None);
    runtime.settle().await;
    assert_eq!(endpoint.attempts(), 1);

    runtime.shutdown().await.unwrap();
}
