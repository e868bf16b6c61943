//! Cooperative cancellation for a single job.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Per-job cooperative cancellation.
///
/// The first reason wins. The reason is stored before the flag flips, so a
/// reader that sees the token cancelled always sees a reason. Waiters parked
/// in [`CancellationToken::cancelled`] are woken when it fires, which lets
/// backoff sleeps and approval waits race against it.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

impl CancellationToken {
    /// An uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Returns true if this call fired it.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        {
            let mut slot = self.reason.write();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.into());
            self.cancelled.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
        true
    }

    /// True once fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Why the token fired.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Completes once the token has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CancellationToken")
            .field(&*self.reason.read())
            .finish()
    }
}
