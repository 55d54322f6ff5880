// ── Read-through response cache ──
//
// Short-lived cache of bulk responses keyed by endpoint + parameters.
// The snapshot store stays authoritative; this cache only saves repeat
// round-trips, and the invalidation coordinator drops entries whenever
// the store commits a newer snapshot of the same kind.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::model::{ActiveAlarm, AlarmConfig, Group, Item, SyncVersion};
use crate::source::DataSource;
use crate::store::{SnapshotStore, StoreKey};

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// Concurrent TTL cache of decoded responses.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Cached value for `key`, if present, unexpired and of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let hit = {
            let entry = self.entries.get(key)?;
            if entry.expires_at <= now {
                None
            } else {
                entry.value.downcast_ref::<T>().cloned()
            }
        };
        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        hit
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value: Arc::new(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

// ── Cache keys ───────────────────────────────────────────────────────

const GROUPS_PREFIX: &str = "groups";
const ITEMS_PREFIX: &str = "items";
const ALARMS_PREFIX: &str = "alarms";

fn items_key(show_orphans: bool) -> String {
    format!("{ITEMS_PREFIX}?showOrphans={show_orphans}")
}

fn alarms_key(item_ids: &[String]) -> String {
    if item_ids.is_empty() {
        format!("{ALARMS_PREFIX}?items=*")
    } else {
        format!("{ALARMS_PREFIX}?items={}", item_ids.join(","))
    }
}

/// What a committed change to `key` makes stale.
enum Invalidation {
    None,
    Prefix(&'static str),
    All,
}

fn invalidation_for(key: StoreKey) -> Invalidation {
    match key {
        StoreKey::Groups => Invalidation::Prefix(GROUPS_PREFIX),
        StoreKey::Items => Invalidation::Prefix(ITEMS_PREFIX),
        StoreKey::Alarms => Invalidation::Prefix(ALARMS_PREFIX),
        StoreKey::Version => Invalidation::All,
        StoreKey::ActiveAlarms
        | StoreKey::AlarmCount
        | StoreKey::SyncStatus
        | StoreKey::Metadata => Invalidation::None,
    }
}

// ── CachedSource ─────────────────────────────────────────────────────

/// A [`DataSource`] that serves Groups, Items and Alarms through a
/// [`ResponseCache`]. Version checks and active-alarm fetches always go
/// to the wrapped source.
pub struct CachedSource<S> {
    inner: S,
    cache: Arc<ResponseCache>,
    ttl: Duration,
}

impl<S: DataSource> CachedSource<S> {
    pub fn new(inner: S, cache: Arc<ResponseCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }
}

impl<S: DataSource> DataSource for CachedSource<S> {
    async fn fetch_version(&self) -> Result<SyncVersion, CoreError> {
        self.inner.fetch_version().await
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, CoreError> {
        if let Some(hit) = self.cache.get::<Vec<Group>>(GROUPS_PREFIX) {
            trace!("groups served from cache");
            return Ok(hit);
        }
        let groups = self.inner.fetch_groups().await?;
        self.cache.insert(GROUPS_PREFIX, groups.clone(), self.ttl);
        Ok(groups)
    }

    async fn fetch_items(&self, show_orphans: bool) -> Result<Vec<Item>, CoreError> {
        let key = items_key(show_orphans);
        if let Some(hit) = self.cache.get::<Vec<Item>>(&key) {
            trace!("items served from cache");
            return Ok(hit);
        }
        let items = self.inner.fetch_items(show_orphans).await?;
        self.cache.insert(key, items.clone(), self.ttl);
        Ok(items)
    }

    async fn fetch_alarms(&self, item_ids: &[String]) -> Result<Vec<AlarmConfig>, CoreError> {
        let key = alarms_key(item_ids);
        if let Some(hit) = self.cache.get::<Vec<AlarmConfig>>(&key) {
            trace!("alarms served from cache");
            return Ok(hit);
        }
        let alarms = self.inner.fetch_alarms(item_ids).await?;
        self.cache.insert(key, alarms.clone(), self.ttl);
        Ok(alarms)
    }

    async fn fetch_active_alarms(&self, item_ids: &[String]) -> Result<Vec<ActiveAlarm>, CoreError> {
        self.inner.fetch_active_alarms(item_ids).await
    }
}

// ── CacheInvalidationCoordinator ─────────────────────────────────────

/// Drops cache entries made stale by store commits, local or remote.
pub struct CacheInvalidationCoordinator {
    cache: Arc<ResponseCache>,
    store: Arc<SnapshotStore>,
    cancel: CancellationToken,
}

impl CacheInvalidationCoordinator {
    pub fn new(cache: Arc<ResponseCache>, store: Arc<SnapshotStore>) -> Self {
        Self {
            cache,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Apply the invalidation rule for one change.
    pub fn on_change(&self, key: StoreKey) {
        match invalidation_for(key) {
            Invalidation::None => {}
            Invalidation::Prefix(prefix) => {
                let dropped = self.cache.invalidate_prefix(prefix);
                if dropped > 0 {
                    debug!(key = %key, dropped, "cache entries invalidated");
                }
            }
            Invalidation::All => {
                self.cache.clear();
                debug!(key = %key, "cache cleared");
            }
        }
    }

    /// Start following store changes. The task stops on `destroy` or when
    /// `parent` is cancelled.
    pub fn init(self: &Arc<Self>, parent: &CancellationToken) -> JoinHandle<()> {
        let mut rx = self.store.subscribe_changes();
        let coordinator = Arc::clone(self);
        let cancel = self.cancel.clone();
        let parent = parent.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = parent.cancelled() => break,
                    change = rx.recv() => match change {
                        Ok(change) => coordinator.on_change(change.key),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "invalidation feed lagged, clearing cache");
                            coordinator.cache.clear();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    pub fn destroy(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new();
        cache.insert("groups", vec![1u32, 2], Duration::from_secs(60));
        assert_eq!(cache.get::<Vec<u32>>("groups"), Some(vec![1, 2]));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get::<Vec<u32>>("groups"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn wrong_type_is_a_miss() {
        let cache = ResponseCache::new();
        cache.insert("groups", 5u8, Duration::from_secs(60));
        assert_eq!(cache.get::<String>("groups"), None);
        // A type mismatch on a live entry does not evict it.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn prefix_invalidation_is_scoped() {
        let cache = ResponseCache::new();
        let ttl = Duration::from_secs(60);
        cache.insert(items_key(true), 1u8, ttl);
        cache.insert(items_key(false), 1u8, ttl);
        cache.insert(alarms_key(&[]), 1u8, ttl);

        assert_eq!(cache.invalidate_prefix(ITEMS_PREFIX), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn alarm_keys_encode_scope() {
        assert_eq!(alarms_key(&[]), "alarms?items=*");
        assert_eq!(
            alarms_key(&["a".to_string(), "b".to_string()]),
            "alarms?items=a,b"
        );
    }
}
