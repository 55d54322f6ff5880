// Scripted fakes shared by the engine scenario tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use secrecy::SecretString;
use tokio::time::Instant;

use vigil_core::{
    ActiveAlarm, AlarmConfig, CoreError, DataSource, Group, Item, MemoryBackend, PushSource,
    PushUpdate, PushUpdateStream, SnapshotStore, StorageBackend, SyncVersion, TabId,
};

pub fn version(v: &str) -> SyncVersion {
    SyncVersion {
        global_version: Some(v.into()),
        user_version: Some("u1".into()),
    }
}

pub fn item(id: &str) -> Item {
    Item {
        id: id.into(),
        name: format!("point {id}"),
        group_id: Some("g1".into()),
        item_type: Some("analog".into()),
        unit: None,
    }
}

pub fn active(id: &str, item_id: &str) -> ActiveAlarm {
    ActiveAlarm {
        id: id.into(),
        item_id: item_id.into(),
        alarm_id: None,
        message: None,
        raised_at: None,
    }
}

pub fn transient() -> CoreError {
    CoreError::ConnectionFailed {
        url: "http://plant".into(),
        reason: "connection reset".into(),
    }
}

pub fn permanent() -> CoreError {
    CoreError::Api {
        message: "unprocessable".into(),
        status: Some(422),
    }
}

pub fn memory_store() -> (Arc<dyn StorageBackend>, Arc<SnapshotStore>) {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let store = Arc::new(SnapshotStore::open(Arc::clone(&backend), TabId::new()));
    (backend, store)
}

// ── FakeSource ──────────────────────────────────────────────────────

/// Scripted `DataSource`. Each list pops its `fail_*` queue before
/// answering; every call is logged by name. Clones share state so a
/// test can keep a handle after moving one into the engine.
#[derive(Clone)]
pub struct FakeSource(Arc<SourceState>);

impl Deref for FakeSource {
    type Target = SourceState;

    fn deref(&self) -> &SourceState {
        &self.0
    }
}

pub struct SourceState {
    pub version: Mutex<Result<SyncVersion, CoreError>>,
    pub version_delay: Mutex<Duration>,
    pub groups: Mutex<Vec<Group>>,
    pub items: Mutex<Vec<Item>>,
    pub alarms: Mutex<Vec<AlarmConfig>>,
    pub active: Mutex<Vec<ActiveAlarm>>,
    pub active_delay: Mutex<Duration>,
    pub fail_groups: Mutex<VecDeque<CoreError>>,
    pub fail_items: Mutex<VecDeque<CoreError>>,
    pub fail_alarms: Mutex<VecDeque<CoreError>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub alarm_scopes: Mutex<Vec<Vec<String>>>,
    pub active_scopes: Mutex<Vec<Vec<String>>>,
    pub active_fetches: AtomicU32,
}

impl FakeSource {
    pub fn new(server_version: SyncVersion) -> Self {
        Self(Arc::new(SourceState {
            version: Mutex::new(Ok(server_version)),
            version_delay: Mutex::new(Duration::ZERO),
            groups: Mutex::new(vec![Group {
                id: "g1".into(),
                name: "Boiler house".into(),
                description: None,
                parent_id: None,
            }]),
            items: Mutex::new(vec![item("i1"), item("i2")]),
            alarms: Mutex::new(vec![AlarmConfig {
                id: "a1".into(),
                item_id: "i1".into(),
                name: Some("High temp".into()),
                severity: Some("high".into()),
                enabled: true,
            }]),
            active: Mutex::new(vec![active("x1", "i1"), active("x2", "i2")]),
            active_delay: Mutex::new(Duration::ZERO),
            fail_groups: Mutex::new(VecDeque::new()),
            fail_items: Mutex::new(VecDeque::new()),
            fail_alarms: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            alarm_scopes: Mutex::new(Vec::new()),
            active_scopes: Mutex::new(Vec::new()),
            active_fetches: AtomicU32::new(0),
        }))
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bulk_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(**c, "groups" | "items" | "alarms"))
            .count()
    }

    pub fn active_fetches(&self) -> u32 {
        self.active_fetches.load(Ordering::SeqCst)
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

fn next_failure(queue: &Mutex<VecDeque<CoreError>>) -> Option<CoreError> {
    queue.lock().unwrap().pop_front()
}

impl DataSource for FakeSource {
    async fn fetch_version(&self) -> Result<SyncVersion, CoreError> {
        self.log("version");
        let delay = *self.version_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.version.lock().unwrap().clone()
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, CoreError> {
        self.log("groups");
        if let Some(e) = next_failure(&self.fail_groups) {
            return Err(e);
        }
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn fetch_items(&self, _show_orphans: bool) -> Result<Vec<Item>, CoreError> {
        self.log("items");
        if let Some(e) = next_failure(&self.fail_items) {
            return Err(e);
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn fetch_alarms(&self, item_ids: &[String]) -> Result<Vec<AlarmConfig>, CoreError> {
        self.log("alarms");
        self.alarm_scopes.lock().unwrap().push(item_ids.to_vec());
        if let Some(e) = next_failure(&self.fail_alarms) {
            return Err(e);
        }
        Ok(self.alarms.lock().unwrap().clone())
    }

    async fn fetch_active_alarms(&self, item_ids: &[String]) -> Result<Vec<ActiveAlarm>, CoreError> {
        self.active_fetches.fetch_add(1, Ordering::SeqCst);
        self.active_scopes.lock().unwrap().push(item_ids.to_vec());
        let delay = *self.active_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.active.lock().unwrap().clone())
    }
}

// ── FakePush ────────────────────────────────────────────────────────

/// How a scripted connection ends after delivering its updates.
#[derive(Clone, Copy)]
pub enum End {
    /// Server closes cleanly.
    Close,
    /// Transport error mid-stream.
    Error,
    /// Stays open until cancelled.
    Hang,
}

pub enum Script {
    Fail(CoreError),
    Open(Vec<PushUpdate>, End),
}

/// Scripted `PushSource`. Once the script runs out every open fails
/// with a transient error.
#[derive(Clone, Default)]
pub struct FakePush(Arc<PushState>);

#[derive(Default)]
pub struct PushState {
    script: Mutex<VecDeque<Script>>,
    opens: Mutex<Vec<Instant>>,
}

impl FakePush {
    pub fn new(script: Vec<Script>) -> Self {
        Self(Arc::new(PushState {
            script: Mutex::new(script.into()),
            opens: Mutex::new(Vec::new()),
        }))
    }

    pub fn opens(&self) -> Vec<Instant> {
        self.0.opens.lock().unwrap().clone()
    }

    /// Gaps between consecutive opens, in whole seconds.
    pub fn gaps_secs(&self) -> Vec<u64> {
        self.opens()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect()
    }
}

pub fn push(count: u64) -> PushUpdate {
    PushUpdate {
        alarm_count: count,
        timestamp: Utc::now(),
    }
}

impl PushSource for FakePush {
    async fn open(&self, _client_id: &str, _token: &SecretString) -> Result<PushUpdateStream, CoreError> {
        self.0.opens.lock().unwrap().push(Instant::now());
        let next = self.0.script.lock().unwrap().pop_front();
        match next {
            None => Err(transient()),
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Open(updates, end)) => {
                let head = stream::iter(updates.into_iter().map(Ok));
                let stream: PushUpdateStream = match end {
                    End::Close => Box::pin(head),
                    End::Error => Box::pin(head.chain(stream::once(async {
                        Err(CoreError::Stream {
                            message: "reset by peer".into(),
                        })
                    }))),
                    End::Hang => Box::pin(head.chain(stream::pending())),
                };
                Ok(stream)
            }
        }
    }
}
