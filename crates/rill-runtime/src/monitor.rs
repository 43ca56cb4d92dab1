//! Endpoint registry and communication driver.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::endpoint::{Endpoint, EndpointId};

/// Per-endpoint cooldown after refused sends.
#[derive(Clone, Debug, Default)]
struct Backoff {
    /// Earliest time a resend may be attempted; `None` when not backed off.
    blocked_until: Option<DateTime<Utc>>,
    /// Cooldown applied by the most recent refusal. Grows while refusals
    /// stay consecutive, reset by any acknowledged send.
    current: Option<Duration>,
}

struct Registered {
    endpoint: Weak<dyn Endpoint>,
    backoff: Backoff,
}

/// Tracks registered endpoints, drives token transfer across them, and
/// applies per-endpoint backoff after refused sends.
///
/// The monitor never owns an endpoint: entries hold weak references and are
/// pruned once the owning port has dropped the endpoint.
pub struct EventMonitor {
    endpoints: HashMap<EndpointId, Registered>,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl EventMonitor {
    pub fn new(backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            endpoints: HashMap::new(),
            backoff_min,
            backoff_max,
        }
    }

    /// Make an endpoint visible to [`communicate`](Self::communicate).
    ///
    /// Re-registering a known endpoint refreshes the reference and keeps its
    /// backoff state.
    pub fn register(&mut self, endpoint: &Arc<dyn Endpoint>) {
        let entry = self
            .endpoints
            .entry(endpoint.id())
            .or_insert_with(|| Registered {
                endpoint: Arc::downgrade(endpoint),
                backoff: Backoff::default(),
            });
        entry.endpoint = Arc::downgrade(endpoint);
    }

    /// Remove an endpoint from the registry. Unknown ids are a no-op.
    pub fn unregister(&mut self, id: EndpointId) {
        self.endpoints.remove(&id);
    }

    /// Ids of all currently registered endpoints.
    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.endpoints.keys().copied().collect()
    }

    /// Attempt token transfer on every endpoint whose backoff has expired.
    ///
    /// Returns true if at least one token moved. Entries whose endpoint has
    /// been dropped are pruned as they are encountered; transfer errors are
    /// logged and do not stop the sweep.
    pub fn communicate(&mut self, now: DateTime<Utc>) -> bool {
        let mut moved = false;
        self.endpoints.retain(|id, entry| {
            let Some(endpoint) = entry.endpoint.upgrade() else {
                tracing::trace!(endpoint = %id, "pruning registration for dropped endpoint");
                return false;
            };

            if let Some(until) = entry.backoff.blocked_until {
                if until > now {
                    return true;
                }
            }

            match endpoint.communicate() {
                Ok(true) => {
                    tracing::debug!(endpoint = %id, owner = %endpoint.owner_actor(), "tokens moved");
                    metrics::counter!("rill_tokens_transferred").increment(1);
                    moved = true;
                }
                Ok(false) => (),
                Err(error) => {
                    tracing::warn!(endpoint = %id, "token transfer failed: {error:#}");
                }
            }
            true
        });

        moved
    }

    /// Apply backoff to an endpoint after a refused send.
    ///
    /// The cooldown doubles on each consecutive refusal, from the configured
    /// minimum up to the configured ceiling.
    pub fn set_backoff(&mut self, id: EndpointId, now: DateTime<Utc>) {
        let Some(entry) = self.endpoints.get_mut(&id) else {
            return;
        };

        let cooldown = match entry.backoff.current {
            Some(current) => (current * 2).min(self.backoff_max),
            None => self.backoff_min,
        };
        entry.backoff.current = Some(cooldown);
        entry.backoff.blocked_until =
            Some(now + chrono::Duration::from_std(cooldown).expect("backoff out of range"));

        tracing::debug!(
            endpoint = %id,
            cooldown = %humantime::Duration::from(cooldown),
            "endpoint backed off"
        );
    }

    /// Reset an endpoint's backoff after an acknowledged send.
    pub fn clear_backoff(&mut self, id: EndpointId) {
        if let Some(entry) = self.endpoints.get_mut(&id) {
            entry.backoff = Backoff::default();
        }
    }

    /// The most imminent time at which a backed-off endpoint becomes
    /// sendable again, or `None` if nothing is backed off.
    pub fn next_slot(&self) -> Option<DateTime<Utc>> {
        self.endpoints
            .values()
            .filter_map(|entry| entry.backoff.blocked_until)
            .min()
    }
}
