//! Clock trait controlling the scheduler's view of time.
//!
//! Every deadline computation in the scheduler goes through [`Clock`] so that
//! timer-based logic (task deadlines, backoff expiry, the fire budget) can be
//! driven by a virtual clock in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Controls the scheduler's view of time.
///
/// In production the default [`SystemClock`] delegates to `chrono::Utc::now()`
/// and `tokio::time::sleep`. Tests substitute a
/// [`DstClock`](crate::dst::DstClock) that only advances when told to.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for the given duration.
    ///
    /// With a virtual clock this completes once the clock has been advanced
    /// past the deadline rather than actually sleeping.
    async fn sleep(&self, duration: Duration);
}

/// The default clock using real system time.
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}
