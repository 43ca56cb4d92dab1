//! Deterministic simulation support.
//!
//! This module provides a test implementation of the [`Clock`] trait so that
//! schedulers can be driven through virtual time: deadlines, backoff expiry,
//! and the fire budget all advance only when the test says so.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rill_runtime::dst::DstClock;
//! use rill_runtime::SchedulerBuilder;
//!
//! # fn example(actor_mgr: Arc<dyn rill_runtime::ActorManager>) {
//! let clock = Arc::new(DstClock::new(chrono::Utc::now()));
//! let scheduler = SchedulerBuilder::new(actor_mgr)
//!     .clock(clock.clone())
//!     .build();
//! # }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::clock::Clock;

/// A deterministic clock that returns controlled time values.
///
/// Time does not advance on its own; it only changes through
/// [`advance`](DstClock::advance) or [`set`](DstClock::set). Calls to
/// [`sleep`](Clock::sleep) complete once the clock has been moved past the
/// sleep deadline.
pub struct DstClock {
    now: Mutex<DateTime<Utc>>,
    notify: Notify,
}

impl DstClock {
    /// Create a new clock starting at the given time.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            notify: Notify::new(),
        }
    }

    /// Advance the clock by the given duration, waking any expired sleepers.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(duration).expect("advance out of range");
        drop(now);
        self.notify.notify_waiters();
    }

    /// Set the clock to a specific time, waking any expired sleepers.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock() = time;
        self.notify.notify_waiters();
    }
}

#[async_trait::async_trait]
impl Clock for DstClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let step = chrono::Duration::from_std(duration).expect("sleep out of range");
        let deadline = self.now() + step;
        loop {
            if self.now() >= deadline {
                return;
            }

            self.notify.notified().await;
        }
    }
}
