use std::sync::Arc;
use std::time::Duration;

use rill_runtime::dst::DstClock;
use rill_runtime::{Config, EndpointId, SchedulePolicy, SchedulerBuilder};

use crate::{
    comes_up_empty, faults, fires_once, start_time, RecordingManager, ScriptedActor, TestScheduler,
};

fn clock() -> Arc<DstClock> {
    Arc::new(DstClock::new(start_time()))
}

#[tokio::test]
async fn cold_start_fires_until_quiescent() {
    let manager = RecordingManager::new();
    let actor = ScriptedActor::new(vec![fires_once(), comes_up_empty()]);
    manager.add_enabled(actor.clone());

    let clock = clock();
    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);

    clock.advance(Duration::from_millis(1));
    runtime.settle().await;

    // One budgeted firing round: a fire, then an empty pass over the action
    // list that reports exhaustion. The activity re-enqueues exactly one
    // further strategy pass, which finds nothing to do.
    assert_eq!(actor.fires(), 2);
    assert_eq!(actor.exhaustions(), vec![(false, true)]);
    assert_eq!(manager.strategy_passes(), 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn faulty_actor_does_not_abort_the_pass() {
    let manager = RecordingManager::new();
    let first = ScriptedActor::new(vec![fires_once(), comes_up_empty()]);
    let broken = ScriptedActor::new(vec![faults("action panicked")]);
    let last = ScriptedActor::new(vec![fires_once(), comes_up_empty()]);
    manager.add_enabled(first.clone());
    manager.add_enabled(broken.clone());
    manager.add_enabled(last.clone());

    let clock = clock();
    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);
    runtime.settle().await;

    // The broken actor was attempted, logged, and skipped; the one behind it
    // still got its turn and the scheduler is still healthy.
    assert_eq!(broken.fires(), 1);
    assert_eq!(first.fires(), 2);
    assert_eq!(last.fires(), 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn round_robin_gives_one_attempt_per_pass() {
    let manager = RecordingManager::new();
    let actor = ScriptedActor::new(vec![fires_once(), fires_once(), comes_up_empty()]);
    manager.add_enabled(actor.clone());

    let clock = clock();
    let scheduler = SchedulerBuilder::new(manager.clone())
        .config(Config {
            policy: SchedulePolicy::RoundRobin,
            ..Config::default()
        })
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);
    runtime.settle().await;

    // Three passes, one attempt each: two productive, one exhausted.
    assert_eq!(actor.fires(), 3);
    assert_eq!(actor.exhaustions().len(), 1);
    assert_eq!(manager.strategy_passes(), 3);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn non_preemptive_drains_in_a_single_pass() {
    let manager = RecordingManager::new();
    let actor = ScriptedActor::new(vec![
        fires_once(),
        fires_once(),
        fires_once(),
        fires_once(),
        fires_once(),
        comes_up_empty(),
    ]);
    manager.add_enabled(actor.clone());

    let clock = clock();
    let scheduler = SchedulerBuilder::new(manager.clone())
        .config(Config {
            policy: SchedulePolicy::NonPreemptive,
            ..Config::default()
        })
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);
    runtime.settle().await;

    assert_eq!(actor.fires(), 6);
    assert_eq!(actor.exhaustions().len(), 1);
    assert_eq!(manager.strategy_passes(), 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn preemptive_firing_respects_the_budget() {
    let manager = RecordingManager::new();
    let actor = ScriptedActor::new(vec![
        fires_once(),
        fires_once(),
        fires_once(),
        fires_once(),
        fires_once(),
        fires_once(),
    ]);
    manager.add_enabled(actor.clone());

    let clock = clock();
    // Each firing round costs 15ms against a 20ms budget, so every pass
    // fits exactly two fires before the actor is asked to yield.
    actor.advance_clock_on_fire(clock.clone(), Duration::from_millis(15));

    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);
    runtime.settle().await;

    // Six fires spread over three passes (plus a final idle pass), and the
    // actor was never driven to exhaustion.
    assert_eq!(actor.fires(), 6);
    assert_eq!(actor.exhaustions(), vec![]);
    assert_eq!(manager.strategy_passes(), 4);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn event_floods_coalesce_into_one_pass() {
    let manager = RecordingManager::new();
    let clock = clock();
    let scheduler = SchedulerBuilder::new(manager.clone())
        .clock(clock.clone())
        .build();
    let runtime = TestScheduler::spawn(scheduler);
    runtime.settle().await;
    assert_eq!(manager.strategy_passes(), 1);

    // A hundred token arrivals before the dispatcher ticks fold into a
    // single queued strategy pass.
    for _ in 0..100 {
        runtime.handle.tunnel_rx(EndpointId::new());
    }
    runtime.settle().await;
    assert_eq!(manager.strategy_passes(), 2);

    runtime.shutdown().await.unwrap();
}
