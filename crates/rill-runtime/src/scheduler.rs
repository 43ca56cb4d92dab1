//! The scheduler run loop and its event API.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::actor::{Actor, ActorId, ActorManager, ReplicationControl};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::endpoint::{Endpoint, EndpointId};
use crate::flag::ShutdownFlag;
use crate::monitor::EventMonitor;
use crate::queue::{TaskKind, TaskQueue};

/// Which firing primitive a strategy pass uses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SchedulePolicy {
    /// Give every enabled actor a budgeted firing round per pass.
    #[default]
    Simple,
    /// One firing attempt per actor per pass, so a hot actor cannot
    /// monopolize a pass.
    RoundRobin,
    /// Drain each actor completely before moving on. Better throughput when
    /// exhaustion is cheap, at the cost of tail latency.
    NonPreemptive,
}

/// Events delivered to the scheduler by the runtime's reactive subsystems.
enum SchedulerEvent {
    TokenReceived(EndpointId),
    SendAcked(EndpointId),
    SendRefused(EndpointId),
    Throttle(EndpointId),
    Platform(Option<ActorId>),
    Register(Arc<dyn Endpoint>),
    Unregister(EndpointId),
    Maintenance,
}

/// Handle used by runtime subsystems to notify the scheduler.
///
/// Every method enqueues an event and returns immediately; the effect
/// becomes visible once the scheduler loop picks the event up. Handles are
/// cheap to clone and may be called from any task.
#[derive(Clone)]
pub struct SchedulerHandle {
    events: mpsc::UnboundedSender<SchedulerEvent>,
    shutdown: ShutdownFlag,
}

impl SchedulerHandle {
    /// A token arrived on `endpoint`; its owner actor may now be able to
    /// fire.
    pub fn tunnel_rx(&self, endpoint: EndpointId) {
        self.send(SchedulerEvent::TokenReceived(endpoint));
    }

    /// A sent token was acknowledged; at least one slot is free in the out
    /// queue and the endpoint may send again at any time.
    pub fn tunnel_tx_ack(&self, endpoint: EndpointId) {
        self.send(SchedulerEvent::SendAcked(endpoint));
    }

    /// A sent token was refused; the endpoint must cool down before
    /// resending.
    pub fn tunnel_tx_nack(&self, endpoint: EndpointId) {
        self.send(SchedulerEvent::SendRefused(endpoint));
    }

    /// The remote side asked us to slow down on `endpoint`.
    pub fn tunnel_tx_throttle(&self, endpoint: EndpointId) {
        self.send(SchedulerEvent::Throttle(endpoint));
    }

    /// A platform event (sensor, timer, external I/O) concerns `actor`, or
    /// every actor when `None`.
    pub fn platform_event(&self, actor: Option<ActorId>) {
        self.send(SchedulerEvent::Platform(actor));
    }

    /// Make `endpoint` visible to the communication loop.
    pub fn register_endpoint(&self, endpoint: &Arc<dyn Endpoint>) {
        self.send(SchedulerEvent::Register(endpoint.clone()));
    }

    /// Remove an endpoint from the communication loop. Unknown ids are fine.
    pub fn unregister_endpoint(&self, endpoint: EndpointId) {
        self.send(SchedulerEvent::Unregister(endpoint));
    }

    /// Ask for a maintenance pass.
    ///
    /// With `delay` set this is a no-op, since the periodic pass will cover
    /// the request anyway; otherwise maintenance runs on the next dispatch.
    pub fn trigger_maintenance(&self, delay: bool) {
        if delay {
            return;
        }
        self.send(SchedulerEvent::Maintenance);
    }

    /// Request shutdown. Idempotent.
    pub fn stop(&self) {
        self.shutdown.raise();
    }

    fn send(&self, event: SchedulerEvent) {
        // The receiver only goes away once the scheduler has shut down, at
        // which point dropping the event is the right outcome.
        let _ = self.events.send(event);
    }
}

/// Builds a [`Scheduler`] with its collaborators wired in.
pub struct SchedulerBuilder {
    config: Config,
    clock: Arc<dyn Clock>,
    actor_mgr: Arc<dyn ActorManager>,
    replication: Option<Arc<dyn ReplicationControl>>,
}

impl SchedulerBuilder {
    pub fn new(actor_mgr: Arc<dyn ActorManager>) -> Self {
        Self {
            config: Config::default(),
            clock: Arc::new(SystemClock),
            actor_mgr,
            replication: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Substitute the clock driving all scheduling decisions.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wire in the node's replication manager. Without one the periodic
    /// replication task is never armed.
    pub fn replication(mut self, replication: Arc<dyn ReplicationControl>) -> Self {
        self.replication = Some(replication);
        self
    }

    pub fn build(self) -> Scheduler {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = ShutdownFlag::new();
        let monitor = EventMonitor::new(self.config.backoff_min, self.config.backoff_max);

        Scheduler {
            handle: SchedulerHandle {
                events: tx,
                shutdown: shutdown.clone(),
            },
            monitor,
            queue: TaskQueue::new(),
            events: rx,
            shutdown,
            clock: self.clock,
            actor_mgr: self.actor_mgr,
            replication: self.replication,
            config: self.config,
        }
    }
}

/// The only active component of a rill runtime.
///
/// Everything else is reactive: subsystems report progress opportunities
/// through a [`SchedulerHandle`] and the scheduler decides when tokens move
/// and which actors fire.
pub struct Scheduler {
    config: Config,
    clock: Arc<dyn Clock>,
    actor_mgr: Arc<dyn ActorManager>,
    replication: Option<Arc<dyn ReplicationControl>>,
    monitor: EventMonitor,
    queue: TaskQueue,
    events: mpsc::UnboundedReceiver<SchedulerEvent>,
    shutdown: ShutdownFlag,
    handle: SchedulerHandle,
}

impl Scheduler {
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run the dispatch loop until [`SchedulerHandle::stop`] is called.
    ///
    /// The queue is primed with the periodic control loops and an immediate
    /// strategy pass. From then on the loop alternates between handling
    /// subsystem events and dispatching due tasks. Exactly one timer is
    /// outstanding at any point: the sleep on the head deadline, recreated
    /// whenever the head changes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let now = self.clock.now();
        self.queue
            .insert(TaskKind::Maintenance, self.config.maintenance_delay, now);
        if self.replication.is_some() {
            self.queue
                .insert(TaskKind::Replication, self.config.replication_interval, now);
        }
        self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);

        let shutdown = self.shutdown.clone();
        loop {
            // Dispatch re-arms a watchdog whenever it empties the queue, so
            // running dry here means the dispatcher itself is broken. Bail
            // rather than deadlock with nothing left to wake us.
            let Some(deadline) = self.queue.head_deadline() else {
                anyhow::bail!("scheduler task queue is empty with no timer armed");
            };
            let delay = (deadline - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                biased;

                _ = shutdown.wait() => break,
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event);
                }
                _ = self.clock.sleep(delay) => self.dispatch_next()?,
            }
        }

        tracing::info!("scheduler stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: SchedulerEvent) {
        let now = self.clock.now();
        match event {
            SchedulerEvent::TokenReceived(endpoint) => {
                tracing::trace!(%endpoint, "token received");
                self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
            }
            SchedulerEvent::SendAcked(endpoint) => {
                self.monitor.clear_backoff(endpoint);
                self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
            }
            SchedulerEvent::SendRefused(endpoint) => {
                self.monitor.set_backoff(endpoint, now);
                if let Some(slot) = self.monitor.next_slot() {
                    let delay = (slot - now).to_std().unwrap_or(Duration::ZERO);
                    self.queue.insert(TaskKind::Strategy, delay, now);
                }
            }
            SchedulerEvent::Throttle(endpoint) => {
                // No policy reacts to throttle requests so far; the nack
                // backoff covers every case observed in practice.
                tracing::trace!(%endpoint, "ignoring throttle request");
            }
            SchedulerEvent::Platform(actor) => {
                tracing::trace!(?actor, "platform event");
                self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
            }
            SchedulerEvent::Register(endpoint) => self.monitor.register(&endpoint),
            SchedulerEvent::Unregister(endpoint) => self.monitor.unregister(endpoint),
            SchedulerEvent::Maintenance => {
                self.queue.insert(TaskKind::Maintenance, Duration::ZERO, now);
            }
        }
    }

    /// Dispatch the task at the head of the queue.
    fn dispatch_next(&mut self) -> anyhow::Result<()> {
        let Some(task) = self.queue.pop() else {
            anyhow::bail!("dispatch with an empty task queue");
        };

        match task.kind {
            TaskKind::Strategy => self.strategy(),
            TaskKind::Replication => self.check_replication(),
            TaskKind::Maintenance => self.maintenance_loop(),
            TaskKind::Watchdog => self.watchdog(),
        }

        // Whatever just ran may have left the queue empty; park a watchdog
        // so there is always a wakeup ahead of the loop.
        if self.queue.is_empty() {
            let now = self.clock.now();
            self.queue
                .insert(TaskKind::Watchdog, self.config.watchdog_delay, now);
        }

        Ok(())
    }

    /// One scheduling pass: move tokens, fire whatever can fire, and keep
    /// the pass going for as long as there is activity.
    fn strategy(&mut self) {
        let now = self.clock.now();
        let did_transfer = self.monitor.communicate(now);

        let actors = self.actor_mgr.enabled_actors();
        let fired = match self.config.policy {
            SchedulePolicy::Simple => self.fire_actors(&actors, Self::fire_actor_preemptive),
            SchedulePolicy::RoundRobin => self.fire_actors(&actors, Self::fire_actor_once),
            SchedulePolicy::NonPreemptive => {
                self.fire_actors(&actors, Self::fire_actor_non_preemptive)
            }
        };

        if did_transfer || !fired.is_empty() {
            let now = self.clock.now();
            self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
        }
    }

    /// Fallback wakeup for an otherwise idle queue. Reaching this means no
    /// event has re-armed the scheduler for a whole watchdog period.
    fn watchdog(&mut self) {
        tracing::warn!("scheduler watchdog triggered, forcing a strategy pass");
        let now = self.clock.now();
        self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
    }

    /// Periodic replication control. Best-effort: a failing pass is logged
    /// and the loop re-arms regardless.
    fn check_replication(&mut self) {
        if let Some(replication) = &self.replication {
            if let Err(error) = replication.replication_loop() {
                tracing::warn!("replication loop failed: {error:#}");
            }
        }

        let now = self.clock.now();
        self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
        self.queue
            .insert(TaskKind::Replication, self.config.replication_interval, now);
    }

    /// Periodic maintenance: migrate actors that have asked for it and
    /// revisit actors denied by policy. Everything here is best-effort.
    fn maintenance_loop(&mut self) {
        for actor in self.actor_mgr.migratable_actors() {
            let Some(node) = actor.migration_target() else {
                continue;
            };
            let on_done = {
                let actor = actor.clone();
                Box::new(move || actor.remove_migration_info())
            };
            if let Err(error) = self.actor_mgr.migrate(actor.id(), node, on_done) {
                tracing::warn!(actor = %actor.id(), node = %node, "migration failed: {error:#}");
            }
        }

        for actor in self.actor_mgr.denied_actors() {
            actor.enable_or_migrate();
        }

        // Actors may have moved around; give the strategy a chance to
        // notice before the next periodic pass.
        let now = self.clock.now();
        self.queue.insert(TaskKind::Strategy, Duration::ZERO, now);
        self.queue
            .insert(TaskKind::Maintenance, self.config.maintenance_delay, now);
    }

    /// Fire each actor in turn, collecting the ids of those that fired at
    /// least one action. A failing actor is logged and skipped for the rest
    /// of the pass; it never aborts the loop.
    fn fire_actors(
        &self,
        actors: &[Arc<dyn Actor>],
        fire_one: fn(&Self, &dyn Actor) -> anyhow::Result<bool>,
    ) -> HashSet<ActorId> {
        let mut fired = HashSet::new();
        for actor in actors {
            match fire_one(self, actor.as_ref()) {
                Ok(true) => {
                    fired.insert(actor.id());
                }
                Ok(false) => (),
                Err(error) => {
                    tracing::error!(actor = %actor.id(), "actor fire failed: {error:?}");
                }
            }
        }

        if !fired.is_empty() {
            metrics::counter!("rill_actors_fired").increment(fired.len() as u64);
        }
        fired
    }

    /// Budgeted firing: repeatedly run the action list until an iteration
    /// comes up empty or the fire budget is spent.
    fn fire_actor_preemptive(&self, actor: &dyn Actor) -> anyhow::Result<bool> {
        if !actor.authorized() {
            return Ok(false);
        }

        let start = self.clock.now();
        let mut actor_fired = false;
        loop {
            let outcome = actor.fire()?;
            actor_fired |= outcome.did_fire;

            if !outcome.did_fire {
                // End of the action list without any firing this round.
                actor.handle_exhaustion(outcome.exhausted, outcome.output_ok);
                break;
            }

            let spent = (self.clock.now() - start).to_std().unwrap_or_default();
            if spent > self.config.fire_budget {
                tracing::debug!(
                    actor = %actor.id(),
                    spent = %humantime::Duration::from(spent),
                    "fire budget spent, yielding"
                );
                break;
            }
        }

        Ok(actor_fired)
    }

    /// Unbudgeted firing: drain the actor completely before returning.
    fn fire_actor_non_preemptive(&self, actor: &dyn Actor) -> anyhow::Result<bool> {
        if !actor.authorized() {
            return Ok(false);
        }

        let mut actor_fired = false;
        loop {
            let outcome = actor.fire()?;
            actor_fired |= outcome.did_fire;

            if !outcome.did_fire {
                actor.handle_exhaustion(outcome.exhausted, outcome.output_ok);
                return Ok(actor_fired);
            }
        }
    }

    /// A single firing attempt.
    fn fire_actor_once(&self, actor: &dyn Actor) -> anyhow::Result<bool> {
        if !actor.authorized() {
            return Ok(false);
        }

        let outcome = actor.fire()?;
        if !outcome.did_fire {
            actor.handle_exhaustion(outcome.exhausted, outcome.output_ok);
        }

        Ok(outcome.did_fire)
    }
}
