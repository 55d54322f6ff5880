use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Check-then-set mutual exclusion for bulk syncs.
///
/// A second caller is turned away, never queued. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    busy: Arc<AtomicBool>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag, or `None` if a sync already holds it.
    pub fn try_acquire(&self) -> Option<SyncPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one sync; releases the guard on drop, so an
/// early return or a cancelled future never leaves the flag stuck.
#[derive(Debug)]
pub struct SyncPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
