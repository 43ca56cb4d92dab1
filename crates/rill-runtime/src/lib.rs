//! The runtime scheduler for rill dataflow graphs.
//!
//! The scheduler is the only active component of a rill runtime. Actors,
//! ports, token transport, and platform sensors are all reactive: whenever
//! one of them believes progress may be possible it reports the opportunity
//! through a [`SchedulerHandle`], and the scheduler decides when to move
//! tokens and which actors to fire.

pub mod actor;
mod clock;
mod config;
pub mod dst;
mod endpoint;
mod flag;
mod monitor;
mod queue;
mod scheduler;

pub use self::actor::{
    Actor, ActorId, ActorManager, FireOutcome, MigrateCallback, NodeId, ReplicationControl,
};
pub use self::clock::{Clock, SystemClock};
pub use self::config::Config;
pub use self::endpoint::{Endpoint, EndpointId};
pub use self::monitor::EventMonitor;
pub use self::scheduler::{SchedulePolicy, Scheduler, SchedulerBuilder, SchedulerHandle};
