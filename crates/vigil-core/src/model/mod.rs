// ── Domain model ──
//
// Canonical types the engine stores and consumers read. Wire records from
// `vigil-api` are converted into these in `crate::convert`.

pub mod alarm;
pub mod snapshot;
pub mod sync;
pub mod topology;

pub use alarm::{ActiveAlarm, AlarmConfig, AlarmCount, CountSource, PushUpdate};
pub use snapshot::Snapshot;
pub use sync::{SyncMetadata, SyncPhase, SyncStatus, SyncVersion};
pub use topology::{Group, Item};

use serde::{Deserialize, Serialize};

/// Whether the consumer is in the foreground. Background refresh pauses
/// while hidden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}
