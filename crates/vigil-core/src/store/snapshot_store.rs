// ── Snapshot store ──
//
// The single source of truth for UI reads. Each key lives in two places:
// the storage backend (survives restarts, shared between instances) and a
// `watch` channel (what consumers read and subscribe to). Local writes go
// backend-first; remote writes arrive as storage events and only touch
// the watch side.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use strum::IntoEnumIterator;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{StorageBackend, StorageEvent, TabId};
use super::keys::StoreKey;
use crate::error::CoreError;
use crate::model::{
    ActiveAlarm, AlarmConfig, AlarmCount, Group, Item, Snapshot, SyncMetadata, SyncStatus,
    SyncVersion,
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

type Slot<T> = watch::Sender<Option<Arc<Snapshot<T>>>>;

/// A committed change to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub key: StoreKey,
    /// Made by another instance sharing the backend.
    pub remote: bool,
}

/// Persistent, observable store of the latest snapshots and sync records.
pub struct SnapshotStore {
    backend: Arc<dyn StorageBackend>,
    tab_id: TabId,
    groups: Slot<Vec<Group>>,
    items: Slot<Vec<Item>>,
    alarms: Slot<Vec<AlarmConfig>>,
    active_alarms: Slot<Vec<ActiveAlarm>>,
    alarm_count: watch::Sender<AlarmCount>,
    version: watch::Sender<Option<SyncVersion>>,
    sync_status: watch::Sender<SyncStatus>,
    metadata: watch::Sender<SyncMetadata>,
    changes: broadcast::Sender<StoreChange>,
}

impl SnapshotStore {
    /// Open a store over `backend`, loading whatever it already holds.
    /// Unreadable or corrupt entries are logged and treated as absent.
    pub fn open(backend: Arc<dyn StorageBackend>, tab_id: TabId) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = Self {
            backend,
            tab_id,
            groups: watch::channel(None).0,
            items: watch::channel(None).0,
            alarms: watch::channel(None).0,
            active_alarms: watch::channel(None).0,
            alarm_count: watch::channel(AlarmCount::default()).0,
            version: watch::channel(None).0,
            sync_status: watch::channel(SyncStatus::default()).0,
            metadata: watch::channel(SyncMetadata::default()).0,
            changes,
        };
        for key in StoreKey::iter() {
            let raw = store.read_raw(key);
            store.apply_value(key, raw.as_deref());
        }
        debug!(tab = %tab_id, "snapshot store loaded");
        store
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn groups(&self) -> Option<Arc<Snapshot<Vec<Group>>>> {
        self.groups.borrow().clone()
    }

    pub fn items(&self) -> Option<Arc<Snapshot<Vec<Item>>>> {
        self.items.borrow().clone()
    }

    pub fn alarms(&self) -> Option<Arc<Snapshot<Vec<AlarmConfig>>>> {
        self.alarms.borrow().clone()
    }

    pub fn active_alarms(&self) -> Option<Arc<Snapshot<Vec<ActiveAlarm>>>> {
        self.active_alarms.borrow().clone()
    }

    pub fn alarm_count(&self) -> AlarmCount {
        *self.alarm_count.borrow()
    }

    pub fn version(&self) -> Option<SyncVersion> {
        self.version.borrow().clone()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status.borrow().clone()
    }

    pub fn metadata(&self) -> SyncMetadata {
        self.metadata.borrow().clone()
    }

    /// Ids from the Items snapshot; the accessible item-id set.
    pub fn item_ids(&self) -> Vec<String> {
        self.items
            .borrow()
            .as_ref()
            .map(|s| s.payload.iter().map(|i| i.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Oldest `fetched_at` across Groups, Items and Alarms. `None` if any
    /// of the three has never been fetched.
    pub fn oldest_topology_fetch(&self) -> Option<DateTime<Utc>> {
        let groups = self.groups.borrow().as_ref()?.fetched_at;
        let items = self.items.borrow().as_ref()?.fetched_at;
        let alarms = self.alarms.borrow().as_ref()?.fetched_at;
        Some(groups.min(items).min(alarms))
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn watch_items(&self) -> watch::Receiver<Option<Arc<Snapshot<Vec<Item>>>>> {
        self.items.subscribe()
    }

    pub fn watch_alarm_count(&self) -> watch::Receiver<AlarmCount> {
        self.alarm_count.subscribe()
    }

    pub fn watch_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync_status.subscribe()
    }

    /// Every committed change, local or remote.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub fn put_groups(&self, snapshot: Snapshot<Vec<Group>>) -> Result<(), CoreError> {
        self.put_snapshot(StoreKey::Groups, &self.groups, snapshot)
    }

    pub fn put_items(&self, snapshot: Snapshot<Vec<Item>>) -> Result<(), CoreError> {
        self.put_snapshot(StoreKey::Items, &self.items, snapshot)
    }

    pub fn put_alarms(&self, snapshot: Snapshot<Vec<AlarmConfig>>) -> Result<(), CoreError> {
        self.put_snapshot(StoreKey::Alarms, &self.alarms, snapshot)
    }

    pub fn put_active_alarms(&self, snapshot: Snapshot<Vec<ActiveAlarm>>) -> Result<(), CoreError> {
        self.put_snapshot(StoreKey::ActiveAlarms, &self.active_alarms, snapshot)
    }

    pub fn set_alarm_count(&self, count: AlarmCount) -> Result<(), CoreError> {
        self.persist(StoreKey::AlarmCount, &count)?;
        self.alarm_count.send_replace(count);
        self.notify(StoreKey::AlarmCount, false);
        Ok(())
    }

    pub fn set_version(&self, version: SyncVersion) -> Result<(), CoreError> {
        self.persist(StoreKey::Version, &version)?;
        self.version.send_replace(Some(version));
        self.notify(StoreKey::Version, false);
        Ok(())
    }

    /// Forget the persisted version so the next gate check reports a change.
    pub fn clear_version(&self) -> Result<(), CoreError> {
        self.backend.remove(StoreKey::Version.as_str(), self.tab_id)?;
        self.version.send_replace(None);
        self.notify(StoreKey::Version, false);
        Ok(())
    }

    pub fn set_metadata(&self, metadata: SyncMetadata) -> Result<(), CoreError> {
        self.persist(StoreKey::Metadata, &metadata)?;
        self.metadata.send_replace(metadata);
        self.notify(StoreKey::Metadata, false);
        Ok(())
    }

    /// Publish a sync status. Observers always see it; a failure to
    /// persist it is logged, not returned.
    pub fn set_sync_status(&self, status: SyncStatus) {
        if let Err(e) = self.persist(StoreKey::SyncStatus, &status) {
            warn!(error = %e, "failed to persist sync status");
        }
        self.sync_status.send_replace(status);
        self.notify(StoreKey::SyncStatus, false);
    }

    /// Mutate the current sync status in place and publish it.
    pub fn update_sync_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut status = self.sync_status();
        f(&mut status);
        self.set_sync_status(status);
    }

    /// Remove every key. Each key is attempted even if an earlier one
    /// fails; the first failure is returned.
    pub fn clear(&self) -> Result<(), CoreError> {
        let mut first_err = None;
        for key in StoreKey::iter() {
            if let Err(e) = self.backend.remove(key.as_str(), self.tab_id) {
                warn!(key = %key, error = %e, "failed to remove key");
                first_err.get_or_insert(e);
            }
            self.apply_value(key, None);
            self.notify(key, false);
        }
        debug!("snapshot store cleared");
        first_err.map_or(Ok(()), Err)
    }

    // ── Cross-instance propagation ───────────────────────────────────

    /// Apply a storage event written by another instance. Returns the key
    /// it touched, or `None` for our own writes and foreign keys.
    pub fn apply_event(&self, event: &StorageEvent) -> Option<StoreKey> {
        if event.origin == Some(self.tab_id) {
            return None;
        }
        let key = StoreKey::from_str(&event.key).ok()?;
        self.apply_value(key, event.new_value.as_deref());
        self.notify(key, true);
        debug!(key = %key, "applied remote change");
        Some(key)
    }

    /// Re-read every key from the backend, e.g. after missing events.
    pub fn reload(&self) {
        for key in StoreKey::iter() {
            let raw = self.read_raw(key);
            self.apply_value(key, raw.as_deref());
            self.notify(key, true);
        }
    }

    /// Follow the backend's change feed until cancelled.
    pub fn spawn_listener(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.backend.subscribe();
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            store.apply_event(&event);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "storage listener lagged, reloading");
                            store.reload();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn put_snapshot<T: Serialize>(
        &self,
        key: StoreKey,
        slot: &Slot<T>,
        snapshot: Snapshot<T>,
    ) -> Result<(), CoreError> {
        self.persist(key, &snapshot)?;
        slot.send_replace(Some(Arc::new(snapshot)));
        self.notify(key, false);
        Ok(())
    }

    fn persist<T: Serialize>(&self, key: StoreKey, value: &T) -> Result<(), CoreError> {
        let json = serde_json::to_string(value)?;
        self.backend.set(key.as_str(), &json, self.tab_id)
    }

    fn notify(&self, key: StoreKey, remote: bool) {
        let _ = self.changes.send(StoreChange { key, remote });
    }

    fn read_raw(&self, key: StoreKey) -> Option<String> {
        match self.backend.get(key.as_str()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read key");
                None
            }
        }
    }

    /// Replace the in-memory value of `key` with `raw` (or the empty
    /// value for `None`).
    fn apply_value(&self, key: StoreKey, raw: Option<&str>) {
        match key {
            StoreKey::Groups => {
                self.groups.send_replace(decode(key, raw).map(Arc::new));
            }
            StoreKey::Items => {
                self.items.send_replace(decode(key, raw).map(Arc::new));
            }
            StoreKey::Alarms => {
                self.alarms.send_replace(decode(key, raw).map(Arc::new));
            }
            StoreKey::ActiveAlarms => {
                self.active_alarms.send_replace(decode(key, raw).map(Arc::new));
            }
            StoreKey::AlarmCount => {
                self.alarm_count
                    .send_replace(decode(key, raw).unwrap_or_default());
            }
            StoreKey::Version => {
                self.version.send_replace(decode(key, raw));
            }
            StoreKey::SyncStatus => {
                let status: Option<SyncStatus> = decode(key, raw);
                self.sync_status
                    .send_replace(status.map(SyncStatus::restored).unwrap_or_default());
            }
            StoreKey::Metadata => {
                self.metadata
                    .send_replace(decode(key, raw).unwrap_or_default());
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: StoreKey, raw: Option<&str>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "ignoring corrupt stored value");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::SyncPhase;
    use crate::store::MemoryBackend;

    const TTL: Duration = Duration::from_secs(1800);

    fn item(id: &str) -> Item {
        Item {
            id: id.into(),
            name: format!("item {id}"),
            group_id: Some("g1".into()),
            item_type: None,
            unit: None,
        }
    }

    fn store_on(backend: &Arc<MemoryBackend>) -> SnapshotStore {
        SnapshotStore::open(Arc::clone(backend) as Arc<dyn StorageBackend>, TabId::new())
    }

    #[test]
    fn writes_survive_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_on(&backend);
        store.put_items(Snapshot::new(vec![item("i1"), item("i2")], TTL)).unwrap();
        store
            .set_version(SyncVersion {
                global_version: Some("v1".into()),
                user_version: None,
            })
            .unwrap();

        let reopened = store_on(&backend);
        assert_eq!(reopened.item_ids(), vec!["i1".to_string(), "i2".to_string()]);
        assert_eq!(
            reopened.version().unwrap().global_version.as_deref(),
            Some("v1")
        );
    }

    #[test]
    fn restored_status_is_never_mid_sync() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_on(&backend);
        store.set_sync_status(SyncStatus {
            phase: SyncPhase::Items,
            is_syncing: true,
            last_error: Some("boom".into()),
            last_completed_at: None,
        });

        let status = store_on(&backend).sync_status();
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(!status.is_syncing);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn corrupt_entry_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set(StoreKey::Groups.as_str(), "{not json", TabId::new())
            .unwrap();
        assert!(store_on(&backend).groups().is_none());
    }

    #[test]
    fn oldest_topology_fetch_needs_all_three() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_on(&backend);
        let old = Utc::now() - chrono::Duration::hours(2);

        store.put_groups(Snapshot::at(vec![], old, TTL)).unwrap();
        store.put_items(Snapshot::new(vec![], TTL)).unwrap();
        assert_eq!(store.oldest_topology_fetch(), None);

        store.put_alarms(Snapshot::new(vec![], TTL)).unwrap();
        assert_eq!(store.oldest_topology_fetch(), Some(old));
    }

    #[test]
    fn own_events_are_ignored_and_foreign_applied() {
        let backend = Arc::new(MemoryBackend::new());
        let a = store_on(&backend);
        let b = store_on(&backend);
        let mut rx = backend.subscribe();

        a.put_items(Snapshot::new(vec![item("i9")], TTL)).unwrap();
        let event = rx.try_recv().unwrap();

        assert_eq!(a.apply_event(&event), None);
        assert_eq!(b.apply_event(&event), Some(StoreKey::Items));
        assert_eq!(b.item_ids(), vec!["i9".to_string()]);
    }

    #[test]
    fn clear_resets_everything() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_on(&backend);
        store.put_items(Snapshot::new(vec![item("i1")], TTL)).unwrap();
        store
            .set_alarm_count(AlarmCount::filtered(3, Utc::now()))
            .unwrap();

        store.clear().unwrap();
        assert!(store.items().is_none());
        assert_eq!(store.alarm_count(), AlarmCount::default());
        assert!(backend.keys().unwrap().is_empty());
    }
}
