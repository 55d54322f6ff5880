#![allow(clippy::unwrap_used)]
// Two store instances sharing one backend see each other's commits.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use common::item;
use vigil_core::{
    FileBackend, MemoryBackend, Snapshot, SnapshotStore, StorageBackend, StoreKey, TabId,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn items_written_in_one_instance_appear_in_the_other() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let a = Arc::new(SnapshotStore::open(Arc::clone(&backend), TabId::new()));
    let b = Arc::new(SnapshotStore::open(Arc::clone(&backend), TabId::new()));

    let cancel = CancellationToken::new();
    let _listener = b.spawn_listener(cancel.clone());
    let mut items = b.watch_items();
    let mut changes = b.subscribe_changes();

    a.put_items(Snapshot::new(vec![item("i1"), item("i2")], Duration::from_secs(60)))
        .unwrap();

    timeout(WAIT, items.wait_for(|s| s.is_some())).await.unwrap().unwrap();
    assert_eq!(b.item_ids(), vec!["i1".to_string(), "i2".to_string()]);

    let change = timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert_eq!(change.key, StoreKey::Items);
    assert!(change.remote);
    cancel.cancel();
}

#[tokio::test]
async fn own_writes_are_not_reported_as_remote() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let a = Arc::new(SnapshotStore::open(Arc::clone(&backend), TabId::new()));

    let cancel = CancellationToken::new();
    let _listener = a.spawn_listener(cancel.clone());
    let mut changes = a.subscribe_changes();

    a.put_items(Snapshot::new(vec![item("i1")], Duration::from_secs(60)))
        .unwrap();

    let change = timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert!(!change.remote);
    // Nothing else follows: the echo from the backend is ignored.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(changes.try_recv().is_err());
    cancel.cancel();
}

#[tokio::test]
async fn clear_in_one_instance_empties_the_other() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let a = Arc::new(SnapshotStore::open(Arc::clone(&backend), TabId::new()));
    a.put_items(Snapshot::new(vec![item("i1")], Duration::from_secs(60)))
        .unwrap();
    let b = Arc::new(SnapshotStore::open(Arc::clone(&backend), TabId::new()));
    assert_eq!(b.item_ids(), vec!["i1".to_string()]);

    let cancel = CancellationToken::new();
    let _listener = b.spawn_listener(cancel.clone());
    let mut items = b.watch_items();

    a.clear().unwrap();
    timeout(WAIT, items.wait_for(|s| s.is_none())).await.unwrap().unwrap();
    cancel.cancel();
}

#[tokio::test]
async fn file_backed_instances_see_external_writes_on_rescan() {
    let dir = tempfile::tempdir().unwrap();
    let backend_a: Arc<dyn StorageBackend> = Arc::new(FileBackend::open(dir.path()).unwrap());
    let backend_b = Arc::new(FileBackend::open(dir.path()).unwrap());

    let a = SnapshotStore::open(backend_a, TabId::new());
    let b_backend: Arc<dyn StorageBackend> = Arc::clone(&backend_b) as Arc<dyn StorageBackend>;
    let b = Arc::new(SnapshotStore::open(b_backend, TabId::new()));

    let cancel = CancellationToken::new();
    let _listener = b.spawn_listener(cancel.clone());
    let mut items = b.watch_items();

    a.put_items(Snapshot::new(vec![item("i3")], Duration::from_secs(60)))
        .unwrap();
    assert!(backend_b.poll_external().unwrap() >= 1);

    timeout(WAIT, items.wait_for(|s| s.is_some())).await.unwrap().unwrap();
    assert_eq!(b.item_ids(), vec!["i3".to_string()]);
    cancel.cancel();
}
