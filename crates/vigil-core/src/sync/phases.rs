// ── Data phases ──
//
// Fetch-and-commit for each topology entity. Transient failures are
// retried with bounded backoff; each successful phase writes its own
// snapshot immediately so progress survives a later failure.

use tracing::debug;

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::model::Snapshot;
use crate::retry::{Backoff, retry_with_backoff};
use crate::source::DataSource;
use crate::store::SnapshotStore;

pub(super) struct Phases<'a, S> {
    pub source: &'a S,
    pub store: &'a SnapshotStore,
    pub config: &'a SyncConfig,
}

impl<S: DataSource> Phases<'_, S> {
    fn backoff(&self) -> Backoff {
        Backoff::new(self.config.refresh.retry_base, self.config.refresh.retry_cap)
    }

    fn attempts(&self) -> u32 {
        self.config.refresh.max_attempts
    }

    pub async fn groups(&self) -> Result<usize, CoreError> {
        let groups = retry_with_backoff("groups", self.backoff(), self.attempts(), || {
            self.source.fetch_groups()
        })
        .await?;
        let n = groups.len();
        self.store
            .put_groups(Snapshot::new(groups, self.config.snapshot_ttl))?;
        debug!(groups = n, "groups committed");
        Ok(n)
    }

    /// Returns the committed item ids, the scope for the Alarms phase.
    pub async fn items(&self) -> Result<Vec<String>, CoreError> {
        let show_orphans = self.config.show_orphans;
        let items = retry_with_backoff("items", self.backoff(), self.attempts(), || {
            self.source.fetch_items(show_orphans)
        })
        .await?;
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        self.store
            .put_items(Snapshot::new(items, self.config.snapshot_ttl))?;
        debug!(items = ids.len(), "items committed");
        Ok(ids)
    }

    pub async fn alarms(&self, item_ids: &[String]) -> Result<usize, CoreError> {
        let alarms = retry_with_backoff("alarms", self.backoff(), self.attempts(), || {
            self.source.fetch_alarms(item_ids)
        })
        .await?;
        let n = alarms.len();
        self.store
            .put_alarms(Snapshot::new(alarms, self.config.snapshot_ttl))?;
        debug!(alarms = n, "alarms committed");
        Ok(n)
    }
}
