// ── Alarm count aggregator ──
//
// The operator-visible count is the length of the permission-filtered
// active-alarm list, never the raw number a push carries. A push (or a
// poll tick) only triggers that filtered fetch. Fetches are single-flight:
// a trigger that lands while one is running marks a rerun instead of
// starting a second request. Every fetch runs under a scope token; once
// the scope is cancelled nothing is written back to the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::model::{AlarmCount, CountSource, PushUpdate, Snapshot};
use crate::source::DataSource;
use crate::store::SnapshotStore;

pub struct AlarmCountAggregator<S> {
    inner: Arc<AggregatorInner<S>>,
}

impl<S> Clone for AlarmCountAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AggregatorInner<S> {
    source: Arc<S>,
    store: Arc<SnapshotStore>,
    ttl: Duration,
    /// Held by the one running drain.
    in_flight: watch::Sender<bool>,
    rerun: AtomicBool,
    scope: Mutex<CancellationToken>,
    last_push: watch::Sender<Option<AlarmCount>>,
}

impl<S: DataSource> AlarmCountAggregator<S> {
    /// `ttl` is stamped on the active-alarm snapshots this writes.
    pub fn new(source: Arc<S>, store: Arc<SnapshotStore>, ttl: Duration) -> Self {
        let (last_push, _) = watch::channel(None);
        let (in_flight, _) = watch::channel(false);
        Self {
            inner: Arc::new(AggregatorInner {
                source,
                store,
                ttl,
                in_flight,
                rerun: AtomicBool::new(false),
                scope: Mutex::new(CancellationToken::new()),
                last_push,
            }),
        }
    }

    /// The count consumers should render.
    pub fn get_count(&self) -> AlarmCount {
        self.inner.store.alarm_count()
    }

    pub fn subscribe(&self) -> watch::Receiver<AlarmCount> {
        self.inner.store.watch_alarm_count()
    }

    /// The raw count from the most recent push, tagged
    /// [`CountSource::Push`]. Diagnostic only.
    pub fn last_push(&self) -> Option<AlarmCount> {
        *self.inner.last_push.borrow()
    }

    pub fn is_fetching(&self) -> bool {
        *self.inner.in_flight.borrow()
    }

    /// Bound every later fetch to `scope`. Cancelling it abandons the
    /// running fetch without a write and drops any pending rerun.
    pub fn set_scope(&self, scope: CancellationToken) {
        *self.inner.scope.lock().unwrap_or_else(PoisonError::into_inner) = scope;
    }

    /// Wait until no fetch holds the slot. After the scope is cancelled
    /// this returns once the running fetch has been abandoned.
    pub async fn settle(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        // The sender lives in `inner`, so the channel cannot close.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// React to a push: record it and trigger a filtered fetch in the
    /// background. Never touches the rendered count directly.
    pub fn on_push(&self, update: PushUpdate) {
        trace!(raw = update.alarm_count, "push received");
        self.inner.last_push.send_replace(Some(AlarmCount {
            value: update.alarm_count,
            last_update: Some(update.timestamp),
            source: CountSource::Push,
        }));

        self.trigger();
    }

    /// Start a filtered fetch in the background unless one is already
    /// running, in which case it reruns once it finishes.
    pub fn trigger(&self) {
        if !self.inner.try_begin() {
            debug!("filtered fetch in flight; coalescing");
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // Failures are logged by drain; the last count stays.
            let _ = inner.drain().await;
        });
    }

    /// Run the filtered fetch now, or mark a rerun if one is in flight.
    /// Returns `Ok(true)` if this call performed the fetch, `Ok(false)`
    /// if it coalesced or the scope was cancelled, and the error of the
    /// final attempt otherwise.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        if !self.inner.try_begin() {
            debug!("filtered fetch in flight; coalescing refresh");
            return Ok(false);
        }
        match self.inner.drain().await {
            Some(outcome) => outcome.map(|()| true),
            None => Ok(false),
        }
    }
}

/// Frees the fetch slot when a drain ends, including a drain whose
/// future is dropped mid-fetch.
struct SlotRelease<'a> {
    in_flight: &'a watch::Sender<bool>,
    held: bool,
}

impl SlotRelease<'_> {
    fn release(&mut self) {
        if std::mem::take(&mut self.held) {
            self.in_flight.send_replace(false);
        }
    }
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: DataSource> AggregatorInner<S> {
    /// Claim the single fetch slot, or flag a rerun for its holder.
    fn try_begin(&self) -> bool {
        if self.claim() {
            return true;
        }
        self.rerun.store(true, Ordering::Release);
        false
    }

    /// Check-then-set on the slot, atomically under the watch lock.
    fn claim(&self) -> bool {
        self.in_flight.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        })
    }

    fn current_scope(&self) -> CancellationToken {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch until no rerun is pending, then release the slot. Returns
    /// the outcome of the last fetch, or `None` if the scope was
    /// cancelled first. The caller must hold the slot.
    async fn drain(&self) -> Option<Result<(), CoreError>> {
        let scope = self.current_scope();
        let mut slot = SlotRelease {
            in_flight: &self.in_flight,
            held: true,
        };
        loop {
            self.rerun.store(false, Ordering::Release);
            let outcome = tokio::select! {
                biased;
                () = scope.cancelled() => {
                    self.rerun.store(false, Ordering::Release);
                    debug!("filtered fetch abandoned: scope cancelled");
                    return None;
                }
                outcome = self.fetch_once() => outcome,
            };
            if let Err(ref e) = outcome {
                warn!(error = %e, "filtered alarm fetch failed; keeping last count");
            }
            if self.rerun.load(Ordering::Acquire) {
                continue;
            }
            slot.release();
            // A trigger may have slipped in between the check and the
            // release; take the slot back for it.
            if self.rerun.load(Ordering::Acquire) && self.claim() {
                slot.held = true;
                continue;
            }
            return Some(outcome);
        }
    }

    async fn fetch_once(&self) -> Result<(), CoreError> {
        let item_ids = self.store.item_ids();
        let active = self.source.fetch_active_alarms(&item_ids).await?;
        let value = u64::try_from(active.len()).unwrap_or(u64::MAX);
        self.store.put_active_alarms(Snapshot::new(active, self.ttl))?;
        self.store.set_alarm_count(AlarmCount::filtered(value, Utc::now()))?;
        debug!(count = value, "filtered alarm count updated");
        Ok(())
    }
}
