// ── Staleness-threshold refresher ──
//
// Keeps a long-running session's topology fresh without waiting for a
// version bump. Runs on a timer while visible and immediately on return
// to the foreground. The three data phases are attempted independently
// (all-settled): one entity failing does not stop the others. While a
// refresh runs the shared sync status reports it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::guard::SyncGuard;
use super::phases::Phases;
use crate::config::SyncConfig;
use crate::model::{SyncPhase, Visibility};
use crate::source::DataSource;
use crate::store::SnapshotStore;

/// Why a check did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAuthenticated,
    Hidden,
    /// Another sync holds the guard.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Skipped(SkipReason),
    Fresh,
    /// A refresh ran; lists the phases that failed after all retries.
    Refreshed { failed: Vec<SyncPhase> },
}

pub struct StalenessRefresher<S> {
    source: Arc<S>,
    store: Arc<SnapshotStore>,
    guard: SyncGuard,
    config: SyncConfig,
    authenticated: watch::Receiver<bool>,
    visibility: watch::Receiver<Visibility>,
}

impl<S: DataSource> StalenessRefresher<S> {
    pub fn new(
        source: Arc<S>,
        store: Arc<SnapshotStore>,
        guard: SyncGuard,
        config: SyncConfig,
        authenticated: watch::Receiver<bool>,
        visibility: watch::Receiver<Visibility>,
    ) -> Self {
        Self {
            source,
            store,
            guard,
            config,
            authenticated,
            visibility,
        }
    }

    /// Whether the topology is older than the stale threshold. A missing
    /// snapshot is stale.
    pub fn is_stale(&self) -> bool {
        let Some(oldest) = self.store.oldest_topology_fetch() else {
            return true;
        };
        let age = (Utc::now() - oldest).to_std().unwrap_or_default();
        age > self.config.refresh.stale_threshold
    }

    pub async fn check_and_refresh(&self) -> RefreshOutcome {
        if !*self.authenticated.borrow() {
            return RefreshOutcome::Skipped(SkipReason::NotAuthenticated);
        }
        if *self.visibility.borrow() == Visibility::Hidden {
            return RefreshOutcome::Skipped(SkipReason::Hidden);
        }
        if !self.is_stale() {
            return RefreshOutcome::Fresh;
        }
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("refresh skipped: sync in progress");
            return RefreshOutcome::Skipped(SkipReason::Busy);
        };

        info!("topology stale; refreshing");
        self.store.update_sync_status(|s| {
            s.is_syncing = true;
            s.phase = SyncPhase::Groups;
        });
        let phases = Phases {
            source: &*self.source,
            store: &self.store,
            config: &self.config,
        };
        let mut failed = Vec::new();
        let mut errors = Vec::new();

        if let Err(e) = phases.groups().await {
            warn!(error = %e, "groups refresh failed");
            errors.push(format!("{}: {e}", SyncPhase::Groups));
            failed.push(SyncPhase::Groups);
        }

        // Alarms are scoped by the fresh item ids, or the stored ones if
        // the Items phase failed.
        self.store.update_sync_status(|s| s.phase = SyncPhase::Items);
        let item_ids = match phases.items().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "items refresh failed");
                errors.push(format!("{}: {e}", SyncPhase::Items));
                failed.push(SyncPhase::Items);
                self.store.item_ids()
            }
        };

        self.store.update_sync_status(|s| s.phase = SyncPhase::Alarms);
        if let Err(e) = phases.alarms(&item_ids).await {
            warn!(error = %e, "alarms refresh failed");
            errors.push(format!("{}: {e}", SyncPhase::Alarms));
            failed.push(SyncPhase::Alarms);
        }

        let now = Utc::now();
        self.store.update_sync_status(|s| {
            s.phase = SyncPhase::Idle;
            s.is_syncing = false;
            if errors.is_empty() {
                s.last_error = None;
                s.last_completed_at = Some(now);
            } else {
                s.last_error = Some(errors.join("; "));
            }
        });

        RefreshOutcome::Refreshed { failed }
    }

    /// Run checks every `check_interval` while visible, and once each
    /// time the consumer comes back to the foreground.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let refresher = Arc::clone(self);
        let mut visibility = self.visibility.clone();
        let period = self.config.refresh.check_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let now_visible = *visibility.borrow_and_update() == Visibility::Visible;
                        if now_visible {
                            debug!("foregrounded; checking staleness");
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => break,
                                _ = refresher.check_and_refresh() => {}
                            }
                            interval.reset();
                        }
                    }
                    _ = interval.tick() => {
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            _ = refresher.check_and_refresh() => {}
                        }
                    }
                }
            }
        })
    }
}
