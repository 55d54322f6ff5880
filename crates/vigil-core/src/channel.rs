// ── Push stream channel ──
//
// Owns the single long-lived push subscription: connect, forward
// updates, reconnect after a clean close (fixed delay) or an error
// (capped exponential backoff, bounded attempts). `disconnect()` is the
// only thing that stops automatic reconnection early.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vigil_api::TokenCell;

use crate::config::StreamConfig;
use crate::error::CoreError;
use crate::model::PushUpdate;
use crate::retry::Backoff;
use crate::source::PushSource;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of the push subscription. Exactly one per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum ChannelState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// How one connection ended.
enum ConnectionEnd {
    Cancelled,
    Closed,
    Failed(CoreError),
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Manages the push subscription and publishes its state and updates.
///
/// Cheaply cloneable; clones share the same connection.
pub struct StreamChannel<P> {
    inner: Arc<ChannelInner<P>>,
}

impl<P> Clone for StreamChannel<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ChannelInner<P> {
    source: Arc<P>,
    token: Arc<TokenCell>,
    config: StreamConfig,
    state: watch::Sender<ChannelState>,
    updates: broadcast::Sender<PushUpdate>,
    parent: CancellationToken,
    run: Mutex<Option<ActiveRun>>,
}

impl<P: PushSource> StreamChannel<P> {
    /// `parent` bounds the lifetime of every connection this channel opens.
    pub fn new(
        source: Arc<P>,
        token: Arc<TokenCell>,
        config: StreamConfig,
        parent: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ChannelInner {
                source,
                token,
                config,
                state,
                updates,
                parent,
                run: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Validated updates, in arrival order.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<PushUpdate> {
        self.inner.updates.subscribe()
    }

    /// Start (or restart) the connection loop. Any previous loop is
    /// cancelled first; the failure counter starts from zero.
    pub fn connect(&self, client_id: &str) {
        let parent = self.inner.parent.clone();
        self.connect_in(client_id, &parent);
    }

    /// Like [`connect`](Self::connect), with the loop bounded by `scope`
    /// instead of the channel's parent. A loop started under an already
    /// cancelled scope exits without touching the state.
    pub fn connect_in(&self, client_id: &str, scope: &CancellationToken) {
        let mut run = self
            .inner
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = run.take() {
            prev.cancel.cancel();
        }

        let cancel = scope.child_token();
        let inner = Arc::clone(&self.inner);
        let client_id = client_id.to_owned();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.run_loop(&client_id, &loop_cancel).await;
        });
        *run = Some(ActiveRun { cancel, handle });
    }

    /// Abort any in-flight attempt or pending reconnect and wait for the
    /// loop to exit. Leaves the channel `Idle`.
    pub async fn disconnect(&self) {
        let run = self
            .inner
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(run) = run {
            run.cancel.cancel();
            let _ = run.handle.await;
        }
        self.inner.state.send_replace(ChannelState::Idle);
        debug!("push channel disconnected");
    }

    /// Whether a connection loop is currently running.
    pub fn is_running(&self) -> bool {
        self.inner
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl<P: PushSource> ChannelInner<P> {
    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    async fn run_loop(&self, client_id: &str, cancel: &CancellationToken) {
        let backoff = Backoff::new(self.config.backoff_base, self.config.backoff_cap);
        let mut failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(token) = self.token.current() else {
                error!("no credential for the push stream; not retrying");
                self.set_state(ChannelState::Error);
                break;
            };

            self.set_state(ChannelState::Connecting);
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                opened = self.source.open(client_id, &token) => opened,
            };

            let end = match opened {
                Ok(stream) => {
                    info!("push stream connected");
                    self.set_state(ChannelState::Connected);
                    failures = 0;
                    self.pump(stream, cancel).await
                }
                Err(e) => ConnectionEnd::Failed(e),
            };

            let delay = match end {
                ConnectionEnd::Cancelled => break,
                ConnectionEnd::Closed => {
                    info!("push stream closed by server");
                    self.set_state(ChannelState::Disconnected);
                    self.config.reconnect_delay
                }
                ConnectionEnd::Failed(e) if e.is_auth() => {
                    error!(error = %e, "push stream rejected credential; not retrying");
                    self.set_state(ChannelState::Error);
                    break;
                }
                ConnectionEnd::Failed(e) => {
                    failures += 1;
                    self.set_state(ChannelState::Error);
                    if failures >= self.config.max_attempts {
                        error!(
                            attempts = failures,
                            error = %e,
                            "push stream reconnection limit reached; giving up"
                        );
                        break;
                    }
                    let delay = backoff.delay(failures);
                    warn!(
                        attempt = failures,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "push stream error; backing off"
                    );
                    delay
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        debug!("push channel loop exiting");
    }

    /// Forward updates until the stream ends, fails, or is cancelled.
    async fn pump(
        &self,
        mut stream: crate::source::PushUpdateStream,
        cancel: &CancellationToken,
    ) -> ConnectionEnd {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return ConnectionEnd::Cancelled,
                next = stream.next() => match next {
                    Some(Ok(update)) => {
                        // No subscribers is fine.
                        let _ = self.updates.send(update);
                    }
                    Some(Err(e)) => return ConnectionEnd::Failed(e),
                    None => return ConnectionEnd::Closed,
                }
            }
        }
    }
}
