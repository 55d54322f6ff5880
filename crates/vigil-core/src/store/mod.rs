// ── Persistent snapshot store ──

mod backend;
mod keys;
mod snapshot_store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StorageEvent, TabId};
pub use keys::{BUS_KEY, StoreKey};
pub use snapshot_store::{SnapshotStore, StoreChange};
