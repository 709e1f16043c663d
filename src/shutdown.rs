use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Cooperative stop signal shared by the client loop and the OS signal task.
///
/// `cancel` is idempotent; the loop observes the token at its suspension
/// points (batch start, connect/send/receive, the inter-batch delay) and is
/// the only owner of the connection, so there is no shared socket to race on.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the token and wakes every pending `cancelled` wait. A second
    /// call is a no-op.
    pub fn cancel(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called, immediately if it already was.
    pub async fn cancelled(&self) {
        loop {
            // register interest before re-checking the flag, otherwise a
            // cancel landing between the check and the await would be missed
            let notified = self.inner.notify.notified();
            if self.inner.stopped.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
