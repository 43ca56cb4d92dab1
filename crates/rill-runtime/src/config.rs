use std::time::Duration;

use crate::scheduler::SchedulePolicy;

pub struct Config {
    /// The period with which the replication control loop runs.
    pub replication_interval: Duration,

    /// Delay between maintenance passes (actor migration and re-enablement
    /// of denied actors).
    ///
    /// Deployments that move actors around aggressively will want this much
    /// lower; the default assumes a mostly static graph.
    pub maintenance_delay: Duration,

    /// How long an otherwise empty task queue waits before the watchdog
    /// fires and forces a strategy pass.
    pub watchdog_delay: Duration,

    /// Budget for one firing round of a single actor under the preemptive
    /// policy.
    ///
    /// This is a cooperative bound, not preemption: the actor is asked to
    /// yield after the budget is spent, but a single `fire()` call that
    /// blocks will hold the loop for however long it takes.
    pub fire_budget: Duration,

    /// Cooldown applied to an endpoint after its first refused send.
    ///
    /// Consecutive refusals double the cooldown up to
    /// [`backoff_max`](Config::backoff_max); any acknowledged send resets it.
    pub backoff_min: Duration,

    /// Ceiling for the per-endpoint send cooldown.
    pub backoff_max: Duration,

    /// The policy driving each strategy pass.
    pub policy: SchedulePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replication_interval: Duration::from_secs(2),
            maintenance_delay: Duration::from_secs(300),
            watchdog_delay: Duration::from_secs(60),
            fire_budget: Duration::from_millis(20),
            backoff_min: Duration::from_millis(10),
            backoff_max: Duration::from_secs(2),
            policy: SchedulePolicy::Simple,
        }
    }
}
