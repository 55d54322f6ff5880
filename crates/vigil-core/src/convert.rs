// ── API-to-domain type conversions ──
//
// Bridges `vigil_api` wire records into the canonical `crate::model`
// types. Timestamps arrive as epoch milliseconds and become `DateTime<Utc>`.

use chrono::{DateTime, Utc};

use vigil_api::{
    ActiveAlarmRecord, AlarmRecord, GroupRecord, ItemRecord, PushFrame, VersionResponse,
};

use crate::model::{ActiveAlarm, AlarmConfig, Group, Item, PushUpdate, SyncVersion};

fn epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

impl From<VersionResponse> for SyncVersion {
    fn from(v: VersionResponse) -> Self {
        Self {
            global_version: v.version,
            user_version: v.user_version,
        }
    }
}

impl From<GroupRecord> for Group {
    fn from(g: GroupRecord) -> Self {
        Self {
            id: g.id,
            name: g.name,
            description: g.description,
            parent_id: g.parent_id,
        }
    }
}

impl From<ItemRecord> for Item {
    fn from(i: ItemRecord) -> Self {
        Self {
            id: i.id,
            name: i.name,
            // Some servers send "" instead of null for ungrouped items.
            group_id: i.group_id.filter(|g| !g.is_empty()),
            item_type: i.item_type,
            unit: i.unit,
        }
    }
}

impl From<AlarmRecord> for AlarmConfig {
    fn from(a: AlarmRecord) -> Self {
        Self {
            id: a.id,
            item_id: a.item_id,
            name: a.name,
            severity: a.severity,
            enabled: a.enabled,
        }
    }
}

impl From<ActiveAlarmRecord> for ActiveAlarm {
    fn from(a: ActiveAlarmRecord) -> Self {
        Self {
            id: a.id,
            item_id: a.item_id,
            alarm_id: a.alarm_id,
            message: a.message,
            raised_at: a.raised_at.and_then(epoch_millis),
        }
    }
}

impl From<PushFrame> for PushUpdate {
    /// Frames are shape-checked upstream, so a negative count never
    /// reaches here; clamp anyway rather than wrap.
    fn from(f: PushFrame) -> Self {
        Self {
            alarm_count: u64::try_from(f.alarm_count).unwrap_or(0),
            timestamp: epoch_millis(f.timestamp).unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_id_becomes_orphan() {
        let item = Item::from(ItemRecord {
            id: "i1".into(),
            name: "FT-200".into(),
            group_id: Some(String::new()),
            item_type: None,
            unit: None,
            value: None,
        });
        assert!(item.is_orphan());
    }

    #[test]
    fn active_alarm_timestamp_from_millis() {
        let alarm = ActiveAlarm::from(ActiveAlarmRecord {
            id: "x".into(),
            item_id: "i1".into(),
            alarm_id: None,
            message: None,
            raised_at: Some(1_760_000_000_000),
        });
        assert_eq!(alarm.raised_at.map(|t| t.timestamp()), Some(1_760_000_000));
    }

    #[test]
    fn push_frame_keeps_raw_count() {
        let update = PushUpdate::from(PushFrame {
            alarm_count: 42,
            timestamp: 0,
        });
        assert_eq!(update.alarm_count, 42);
    }
}
