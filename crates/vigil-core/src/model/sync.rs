// ── Sync bookkeeping types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Server configuration generation as last seen by this client.
///
/// Compared field by field, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncVersion {
    pub global_version: Option<String>,
    pub user_version: Option<String>,
}

/// Bulk-sync phases, in the order a sync walks through them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SyncPhase {
    #[default]
    Idle,
    VersionCheck,
    Groups,
    Items,
    Alarms,
    Complete,
}

/// Observable state of the bulk sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub is_syncing: bool,
    pub last_error: Option<String>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Status as restored from persistence. A sync cannot survive a
    /// restart, so any in-progress marker is dropped.
    pub(crate) fn restored(self) -> Self {
        Self {
            phase: SyncPhase::Idle,
            is_syncing: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Set once a full Groups → Items → Alarms pass has committed.
    pub data_synced: bool,
}
