//! `vigil status`: the persisted snapshot, read offline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use vigil_core::{AlarmCount, Snapshot, SnapshotStore, SyncMetadata, SyncStatus};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output::{self, FieldRow};

#[derive(Debug, Serialize)]
struct SnapshotSummary {
    count: usize,
    fetched_at: DateTime<Utc>,
    age_secs: u64,
    expired: bool,
}

impl SnapshotSummary {
    fn of<T>(snapshot: &Arc<Snapshot<Vec<T>>>, now: DateTime<Utc>) -> Self {
        Self {
            count: snapshot.payload.len(),
            fetched_at: snapshot.fetched_at,
            age_secs: snapshot.age(now).as_secs(),
            expired: snapshot.is_expired(now),
        }
    }

    fn describe(summary: Option<&Self>) -> String {
        summary.map_or_else(
            || "never fetched".into(),
            |s| {
                let age = humantime::format_duration(Duration::from_secs(s.age_secs));
                let stale = if s.expired { ", expired" } else { "" };
                format!("{} ({age} ago{stale})", s.count)
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    data_dir: String,
    global_version: Option<String>,
    user_version: Option<String>,
    groups: Option<SnapshotSummary>,
    items: Option<SnapshotSummary>,
    alarms: Option<SnapshotSummary>,
    active_alarms: Option<SnapshotSummary>,
    alarm_count: AlarmCount,
    sync: SyncStatus,
    metadata: SyncMetadata,
}

impl StatusReport {
    fn empty(dir: &Path) -> Self {
        Self {
            data_dir: dir.display().to_string(),
            global_version: None,
            user_version: None,
            groups: None,
            items: None,
            alarms: None,
            active_alarms: None,
            alarm_count: AlarmCount::default(),
            sync: SyncStatus::default(),
            metadata: SyncMetadata::default(),
        }
    }

    fn from_store(dir: &Path, store: &SnapshotStore) -> Self {
        let now = Utc::now();
        let version = store.version().unwrap_or_default();
        Self {
            data_dir: dir.display().to_string(),
            global_version: version.global_version,
            user_version: version.user_version,
            groups: store.groups().map(|s| SnapshotSummary::of(&s, now)),
            items: store.items().map(|s| SnapshotSummary::of(&s, now)),
            alarms: store.alarms().map(|s| SnapshotSummary::of(&s, now)),
            active_alarms: store.active_alarms().map(|s| SnapshotSummary::of(&s, now)),
            alarm_count: store.alarm_count(),
            sync: store.sync_status(),
            metadata: store.metadata(),
        }
    }
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_owned()
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "-".into(), |t| t.to_rfc3339())
}

fn rows(r: &StatusReport) -> Vec<FieldRow> {
    let count = match r.alarm_count.last_update {
        Some(at) => format!("{} ({}, {})", r.alarm_count.value, r.alarm_count.source, at.to_rfc3339()),
        None => "-".into(),
    };
    vec![
        FieldRow::new("Data dir", r.data_dir.clone()),
        FieldRow::new("Version", or_dash(r.global_version.as_deref())),
        FieldRow::new("User version", or_dash(r.user_version.as_deref())),
        FieldRow::new("Groups", SnapshotSummary::describe(r.groups.as_ref())),
        FieldRow::new("Items", SnapshotSummary::describe(r.items.as_ref())),
        FieldRow::new("Alarm configs", SnapshotSummary::describe(r.alarms.as_ref())),
        FieldRow::new("Active alarms", SnapshotSummary::describe(r.active_alarms.as_ref())),
        FieldRow::new("Alarm count", count),
        FieldRow::new("Sync phase", r.sync.phase.to_string()),
        FieldRow::new("Last sync", timestamp(r.metadata.last_sync_time)),
        FieldRow::new("Last completed", timestamp(r.sync.last_completed_at)),
        FieldRow::new("Last error", or_dash(r.sync.last_error.as_deref())),
    ]
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (_profile, dir) = config::local(global)?;
    let report = match super::open_store(&dir)? {
        Some(store) => StatusReport::from_store(&dir, &store),
        None => StatusReport::empty(&dir),
    };

    let out = output::render_single(global.output, &report, rows, |r| {
        r.alarm_count.value.to_string()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
