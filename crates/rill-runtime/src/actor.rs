//! Contracts the scheduler relies on from the rest of the runtime.
//!
//! Actors, the actor manager, and replication control are owned by other
//! subsystems; the scheduler only ever calls the methods below, one call at
//! a time from its own loop.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Identifies an actor within the runtime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a runtime node in the cluster.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The outcome of a single pass over an actor's action list.
#[derive(Copy, Clone, Debug)]
pub struct FireOutcome {
    /// At least one action fired during the pass.
    pub did_fire: bool,
    /// Output ports had room for everything the pass produced.
    pub output_ok: bool,
    /// The actor considers its input streams exhausted.
    pub exhausted: bool,
}

/// A reactive computational unit with a priority-ordered action list.
///
/// All methods are invoked from the scheduler loop, never concurrently;
/// implementations may use interior mutability without further locking.
pub trait Actor: Send + Sync {
    fn id(&self) -> ActorId;

    /// Whether this actor is currently permitted to run at all.
    fn authorized(&self) -> bool;

    /// Attempt the highest-priority enabled action.
    ///
    /// An error marks the actor faulty for this pass; the scheduler logs it
    /// and moves on to the next actor.
    fn fire(&self) -> anyhow::Result<FireOutcome>;

    /// Called once a firing round ends without any action firing.
    fn handle_exhaustion(&self, exhausted: bool, output_ok: bool);

    /// The node this actor has asked to migrate to, if any.
    fn migration_target(&self) -> Option<NodeId> {
        None
    }

    /// Clear the recorded migration request once the move has completed.
    fn remove_migration_info(&self) {}

    /// Re-enable a denied actor, or start migrating it if still denied.
    fn enable_or_migrate(&self) {}
}

/// Callback invoked once a migration has completed.
pub type MigrateCallback = Box<dyn FnOnce() + Send>;

/// Enumerates and migrates the actors hosted on this runtime.
pub trait ActorManager: Send + Sync {
    /// Actors currently able to fire.
    fn enabled_actors(&self) -> Vec<Arc<dyn Actor>>;

    /// Actors with a pending migration request.
    fn migratable_actors(&self) -> Vec<Arc<dyn Actor>>;

    /// Actors denied by policy, candidates for re-enablement.
    fn denied_actors(&self) -> Vec<Arc<dyn Actor>>;

    /// Move an actor to another node. `on_done` runs when the move has
    /// completed on the remote side.
    fn migrate(
        &self,
        actor: ActorId,
        node: NodeId,
        on_done: MigrateCallback,
    ) -> anyhow::Result<()>;
}

/// The slice of the node's replication manager the scheduler drives.
pub trait ReplicationControl: Send + Sync {
    /// One pass of the replication control loop.
    fn replication_loop(&self) -> anyhow::Result<()>;
}
