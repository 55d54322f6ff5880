// ── Sync engine facade ──
//
// Wires every component together and owns their lifetimes. Two scopes:
//
// - engine scope (`init` → `destroy`): store listener, cache
//   invalidation, cross-instance session listener, auth watcher;
// - session scope (login → logout): bulk sync, stream channel, push
//   bridge, polling fallback and its supervisor, staleness refresher.
//
// Session work, count fetches included, runs under a child token that
// logout cancels before the store is cleared, so a new login starts from
// a clean slate.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_api::TokenCell;

use crate::aggregator::AlarmCountAggregator;
use crate::cache::{CacheInvalidationCoordinator, CachedSource, ResponseCache};
use crate::channel::{ChannelState, StreamChannel};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{AlarmCount, SyncPhase, SyncStatus, Visibility};
use crate::poll::PollFallbackCoordinator;
use crate::session::Session;
use crate::source::{DataSource, PushSource};
use crate::store::{SnapshotStore, StorageBackend, StoreKey, TabId};
use crate::sync::{BackgroundSyncOrchestrator, RefreshOutcome, StalenessRefresher, SyncGuard};

/// The client-side synchronization engine.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Construct with [`new`],
/// start background work with [`init`], tear down with [`destroy`].
///
/// [`new`]: SyncEngine::new
/// [`init`]: SyncEngine::init
/// [`destroy`]: SyncEngine::destroy
pub struct SyncEngine<S, P> {
    inner: Arc<EngineInner<S, P>>,
}

impl<S, P> Clone for SyncEngine<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<S, P> {
    config: EngineConfig,
    store: Arc<SnapshotStore>,
    invalidation: Arc<CacheInvalidationCoordinator>,
    session: Arc<Session>,
    orchestrator: Arc<BackgroundSyncOrchestrator<CachedSource<S>>>,
    refresher: Arc<StalenessRefresher<CachedSource<S>>>,
    channel: StreamChannel<P>,
    aggregator: AlarmCountAggregator<CachedSource<S>>,
    poller: PollFallbackCoordinator<CachedSource<S>>,
    visibility: watch::Sender<Visibility>,
    cancel: CancellationToken,
    /// Child of `cancel` for the current login; replaced on each login.
    session_cancel: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    session_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: DataSource, P: PushSource> SyncEngine<S, P> {
    /// Build every component. Does not start anything.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn StorageBackend>,
        source: S,
        push: P,
        token: Arc<TokenCell>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let store = Arc::new(SnapshotStore::open(backend, TabId::new()));

        let cache = Arc::new(ResponseCache::new());
        let source = Arc::new(CachedSource::new(
            source,
            Arc::clone(&cache),
            config.sync.cache_ttl,
        ));
        let invalidation = Arc::new(CacheInvalidationCoordinator::new(cache, Arc::clone(&store)));

        let session = Arc::new(Session::new(Arc::clone(&token), Arc::clone(&store)));
        let (visibility, _) = watch::channel(Visibility::Visible);

        let guard = SyncGuard::new();
        let orchestrator = Arc::new(BackgroundSyncOrchestrator::new(
            Arc::clone(&source),
            Arc::clone(&store),
            guard.clone(),
            config.sync.clone(),
        ));
        let refresher = Arc::new(StalenessRefresher::new(
            Arc::clone(&source),
            Arc::clone(&store),
            guard,
            config.sync.clone(),
            session.subscribe_authenticated(),
            visibility.subscribe(),
        ));

        let channel = StreamChannel::new(
            Arc::new(push),
            token,
            config.sync.stream.clone(),
            cancel.clone(),
        );
        let aggregator =
            AlarmCountAggregator::new(Arc::clone(&source), Arc::clone(&store), config.sync.snapshot_ttl);
        let poller = PollFallbackCoordinator::new(
            aggregator.clone(),
            channel.subscribe_state(),
            config.sync.poll.clone(),
            cancel.clone(),
        );

        let session_cancel = cancel.child_token();
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                invalidation,
                session,
                orchestrator,
                refresher,
                channel,
                aggregator,
                poller,
                visibility,
                cancel,
                session_cancel: Mutex::new(session_cancel),
                task_handles: Mutex::new(Vec::new()),
                session_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.inner.store
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start engine-scoped tasks. If the session is already authenticated
    /// the session scope starts right away.
    pub async fn init(&self) {
        let cancel = self.inner.cancel.clone();
        let mut handles = self.inner.task_handles.lock().await;

        handles.push(self.inner.store.spawn_listener(cancel.clone()));
        handles.push(self.inner.invalidation.init(&cancel));
        let engine = self.clone();
        handles.push(self.inner.session.spawn_listener_with(cancel.clone(), move || {
            let engine = engine.clone();
            async move { engine.end_session().await }
        }));

        let engine = self.clone();
        let mut auth = self.inner.session.subscribe_authenticated();
        handles.push(tokio::spawn(async move {
            let mut active = *auth.borrow_and_update();
            if active {
                engine.start_session().await;
            }
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = auth.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let now = *auth.borrow_and_update();
                        if now == active {
                            continue;
                        }
                        active = now;
                        if now {
                            engine.start_session().await;
                        } else {
                            engine.end_session().await;
                        }
                    }
                }
            }
        }));

        info!(tab = %self.inner.store.tab_id(), "sync engine initialised");
    }

    /// Cancel everything and wait for every task to exit.
    pub async fn destroy(&self) {
        self.inner.cancel.cancel();
        self.inner.invalidation.destroy();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.end_session().await;
        debug!("sync engine destroyed");
    }

    async fn start_session(&self) {
        let child = self.inner.cancel.child_token();
        *self.inner.session_cancel.lock().await = child.clone();
        self.inner.aggregator.set_scope(child.clone());
        let mut handles = self.inner.session_handles.lock().await;

        handles.push(self.inner.refresher.spawn(child.clone()));
        handles.push(self.inner.poller.spawn_supervisor(child.clone()));
        handles.push(self.spawn_push_bridge(child.clone()));

        // Safety net runs from the start; it disables itself once the
        // stream proves stable.
        self.inner.poller.start();

        // Populate the store before the stream starts driving fetches.
        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            tokio::select! {
                biased;
                () = child.cancelled() => return,
                synced = engine.inner.orchestrator.run_if_stale() => {
                    debug!(synced, "startup sync finished");
                }
            }
            engine
                .inner
                .channel
                .connect_in(&engine.inner.config.client_id, &child);
        }));

        info!("session started");
    }

    async fn end_session(&self) {
        self.inner.session_cancel.lock().await.cancel();
        self.inner.channel.disconnect().await;
        self.inner.poller.stop();
        self.inner.orchestrator.reset();

        let mut handles = self.inner.session_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);
        // Detached fetches see the cancelled scope and drop their result.
        self.inner.aggregator.settle().await;

        // A sync cancelled mid-flight leaves its marker behind.
        if self.inner.store.sync_status().is_syncing {
            self.inner.store.update_sync_status(|s| {
                s.phase = SyncPhase::Idle;
                s.is_syncing = false;
            });
        }
        info!("session ended");
    }

    /// Hand every validated push to the aggregator.
    fn spawn_push_bridge(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.inner.channel.subscribe_updates();
        let aggregator = self.inner.aggregator.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    update = rx.recv() => match update {
                        Ok(update) => aggregator.on_push(update),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "push bridge lagged; refetching");
                            aggregator.trigger();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    // ── Session actions ──────────────────────────────────────────────

    pub fn login(&self, token: SecretString, user: Option<String>) -> Result<(), CoreError> {
        self.inner.session.login(token, user)
    }

    /// Stop session work, then drop the credential and clear the store.
    /// Nothing fetched before the call can land in the store after it.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.end_session().await;
        self.inner.session.logout()
    }

    // ── Consumer surface ─────────────────────────────────────────────

    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner.visibility.send_replace(visibility);
    }

    pub fn alarm_count(&self) -> watch::Receiver<AlarmCount> {
        self.inner.aggregator.subscribe()
    }

    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel.subscribe_state()
    }

    /// Rendered count as a `Stream`, starting with the current value.
    pub fn alarm_count_stream(&self) -> WatchStream<AlarmCount> {
        WatchStream::new(self.alarm_count())
    }

    /// Channel transitions as a `Stream`, starting with the current state.
    pub fn channel_state_stream(&self) -> WatchStream<ChannelState> {
        WatchStream::new(self.channel_state())
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.inner.store.sync_status()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller.is_polling()
    }

    /// One filtered count fetch, outside any timer. If another fetch is
    /// already in flight, returns the current count without waiting.
    pub async fn refresh_count(&self) -> Result<AlarmCount, CoreError> {
        self.inner.aggregator.refresh().await?;
        Ok(self.inner.aggregator.get_count())
    }

    /// Run the version gate (and bulk sync if needed) now. `force` first
    /// forgets the persisted version so the gate always reports a change.
    pub async fn sync_now(&self, force: bool) -> bool {
        if force {
            if let Err(e) = self.inner.store.clear_version() {
                warn!(error = %e, "failed to clear persisted version");
            }
            // The listener would clear it too, but not before this run.
            self.inner.invalidation.on_change(StoreKey::Version);
        }
        self.inner.orchestrator.reset();
        self.inner.orchestrator.run_if_stale().await
    }

    /// Run one staleness check now.
    pub async fn check_staleness(&self) -> RefreshOutcome {
        self.inner.refresher.check_and_refresh().await
    }
}
