use std::fmt;

use uuid::Uuid;

use crate::actor::ActorId;

/// Identifies one end of a token-carrying connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EndpointId(Uuid);

impl EndpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One end of a token-carrying link, attached to a port of one actor.
///
/// Endpoints are owned by their ports. The monitor keeps only weak
/// references, so registering an endpoint never extends its lifetime past
/// the port that owns it.
pub trait Endpoint: Send + Sync {
    fn id(&self) -> EndpointId;

    /// The actor whose port this endpoint belongs to.
    fn owner_actor(&self) -> ActorId;

    /// Move pending tokens across this endpoint.
    ///
    /// Returns true if at least one token was transferred.
    fn communicate(&self) -> anyhow::Result<bool>;
}
