//! Read pacing for a bridged stream.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// One-slot read permit.
///
/// The bridge reads the next request frame only after acquiring the permit.
/// Requests do not accumulate: arming an already armed permit is a no-op
/// apart from the request counter, so at most one frame is ever granted
/// ahead of the pending exchange.
#[derive(Debug, Default)]
pub struct ReadDemand {
    armed: AtomicBool,
    notify: Notify,
    requests: AtomicU64,
}

impl ReadDemand {
    /// Create a disarmed permit.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Signal readiness for the next frame.
    pub fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Wait until the permit is armed, then consume it.
    pub async fn acquire(&self) {
        loop {
            if self.armed.swap(false, Ordering::AcqRel) {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Returns `true` if a frame may be read without waiting.
    #[must_use]
    pub fn is_armed(&self) -> bool { self.armed.load(Ordering::Acquire) }

    /// Total number of readiness signals so far.
    #[must_use]
    pub fn requests(&self) -> u64 { self.requests.load(Ordering::Relaxed) }
}
