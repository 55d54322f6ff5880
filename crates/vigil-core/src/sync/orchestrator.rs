// ── Background sync orchestrator ──
//
// On start or resume: version gate first, then Groups → Items → Alarms
// strictly in order when the server reports a new version. Runs at most
// once per session; logout resets it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, error, info};

use super::guard::SyncGuard;
use super::phases::Phases;
use super::version_gate::{VersionCheck, VersionGate};
use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::model::{SyncMetadata, SyncPhase, SyncStatus, SyncVersion};
use crate::source::DataSource;
use crate::store::SnapshotStore;

pub struct BackgroundSyncOrchestrator<S> {
    source: Arc<S>,
    store: Arc<SnapshotStore>,
    guard: SyncGuard,
    config: SyncConfig,
    has_synced: AtomicBool,
}

impl<S: DataSource> BackgroundSyncOrchestrator<S> {
    pub fn new(source: Arc<S>, store: Arc<SnapshotStore>, guard: SyncGuard, config: SyncConfig) -> Self {
        Self {
            source,
            store,
            guard,
            config,
            has_synced: AtomicBool::new(false),
        }
    }

    pub fn has_synced(&self) -> bool {
        self.has_synced.load(Ordering::Acquire)
    }

    /// Allow the next `run_if_stale` to sync again. Called on logout.
    pub fn reset(&self) {
        self.has_synced.store(false, Ordering::Release);
    }

    /// Run the version gate and, if the server moved on, a full bulk
    /// sync. Returns `true` only when a bulk sync committed.
    ///
    /// Never fails: errors end up in the store's [`SyncStatus`].
    pub async fn run_if_stale(&self) -> bool {
        if self.has_synced() {
            debug!("already synced this session; skipping");
            return false;
        }
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("sync already in progress; skipping");
            return false;
        };

        self.store.update_sync_status(|s| {
            s.phase = SyncPhase::VersionCheck;
            s.is_syncing = true;
            s.last_error = None;
        });

        let persisted = self.store.version();
        let fetched = match VersionGate::check(&*self.source, persisted.as_ref()).await {
            VersionCheck::Unchanged => {
                self.has_synced.store(true, Ordering::Release);
                self.store.update_sync_status(|s| {
                    s.phase = SyncPhase::Idle;
                    s.is_syncing = false;
                });
                return false;
            }
            VersionCheck::Changed(v) => v,
        };

        match self.pull(fetched).await {
            Ok(()) => {
                self.has_synced.store(true, Ordering::Release);
                let now = Utc::now();
                self.store.set_sync_status(SyncStatus {
                    phase: SyncPhase::Complete,
                    is_syncing: true,
                    last_error: None,
                    last_completed_at: Some(now),
                });
                self.store.set_sync_status(SyncStatus {
                    phase: SyncPhase::Idle,
                    is_syncing: false,
                    last_error: None,
                    last_completed_at: Some(now),
                });
                info!("bulk sync complete");
                true
            }
            Err((phase, e)) => {
                error!(phase = %phase, error = %e, "bulk sync failed");
                self.store.update_sync_status(|s| {
                    s.phase = SyncPhase::Idle;
                    s.is_syncing = false;
                    s.last_error = Some(format!("{phase}: {e}"));
                });
                false
            }
        }
    }

    /// The three data phases in dependency order, then the version commit.
    async fn pull(&self, version: SyncVersion) -> Result<(), (SyncPhase, CoreError)> {
        let phases = Phases {
            source: &*self.source,
            store: &self.store,
            config: &self.config,
        };

        self.enter(SyncPhase::Groups);
        phases.groups().await.map_err(|e| (SyncPhase::Groups, e))?;

        self.enter(SyncPhase::Items);
        let item_ids = phases.items().await.map_err(|e| (SyncPhase::Items, e))?;

        self.enter(SyncPhase::Alarms);
        phases
            .alarms(&item_ids)
            .await
            .map_err(|e| (SyncPhase::Alarms, e))?;

        self.store
            .set_version(version)
            .and_then(|()| {
                self.store.set_metadata(SyncMetadata {
                    last_sync_time: Some(Utc::now()),
                    data_synced: true,
                })
            })
            .map_err(|e| (SyncPhase::Complete, e))
    }

    fn enter(&self, phase: SyncPhase) {
        debug!(phase = %phase, "sync phase");
        self.store.update_sync_status(|s| s.phase = phase);
    }
}
