use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

struct Shared {
    state: AtomicBool,
    notify: Notify,
}

/// A one-shot async flag used to request scheduler shutdown.
///
/// Raising the flag is idempotent and wakes every waiter; the flag never
/// resets once raised.
#[derive(Clone)]
pub(crate) struct ShutdownFlag(Arc<Shared>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(Shared {
            state: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    pub fn raise(&self) {
        self.0.state.store(true, Ordering::Release);
        self.0.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.0.state.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            if self.is_raised() {
                return;
            }

            // Register interest before the re-check so a raise between the
            // check and the await is not lost.
            let notified = self.0.notify.notified();
            if self.is_raised() {
                return;
            }

            notified.await;
        }
    }
}
