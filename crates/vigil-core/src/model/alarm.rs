// ── Alarm domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// An alarm definition attached to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub id: String,
    pub item_id: String,
    pub name: Option<String>,
    pub severity: Option<String>,
    pub enabled: bool,
}

/// A currently raised alarm, as returned by the permission-filtered query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAlarm {
    pub id: String,
    pub item_id: String,
    pub alarm_id: Option<String>,
    pub message: Option<String>,
    pub raised_at: Option<DateTime<Utc>>,
}

/// Where an [`AlarmCount`] value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum CountSource {
    /// Server-wide count from the push stream. Never shown to operators.
    Push,
    /// Length of the permission-filtered active-alarm list.
    #[default]
    FilteredFetch,
}

/// The operator-visible active alarm count.
///
/// The stored count is always tagged [`CountSource::FilteredFetch`]; a
/// push-tagged value only exists as the aggregator's diagnostic record of
/// the last raw push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmCount {
    pub value: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub source: CountSource,
}

impl AlarmCount {
    pub fn filtered(value: u64, at: DateTime<Utc>) -> Self {
        Self {
            value,
            last_update: Some(at),
            source: CountSource::FilteredFetch,
        }
    }
}

/// One validated push-stream update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushUpdate {
    /// Unfiltered, system-wide count.
    pub alarm_count: u64,
    pub timestamp: DateTime<Utc>,
}
