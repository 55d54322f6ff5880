// ── Polling fallback ──
//
// Safety net for the push stream: refetch the filtered count on a fixed
// interval until the stream has been stable long enough, and resume if
// the stream stays down past a grace period. Every decision reads the
// live channel state at the moment it is made.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator::AlarmCountAggregator;
use crate::channel::ChannelState;
use crate::config::PollConfig;
use crate::source::DataSource;

struct PollRun {
    generation: u64,
    cancel: CancellationToken,
}

pub struct PollFallbackCoordinator<S> {
    inner: Arc<PollInner<S>>,
}

impl<S> Clone for PollFallbackCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PollInner<S> {
    aggregator: AlarmCountAggregator<S>,
    channel_state: watch::Receiver<ChannelState>,
    config: PollConfig,
    parent: CancellationToken,
    run: Mutex<Option<PollRun>>,
    next_generation: Mutex<u64>,
}

fn is_down(state: ChannelState) -> bool {
    matches!(
        state,
        ChannelState::Disconnected | ChannelState::Error | ChannelState::Connecting
    )
}

impl<S: DataSource> PollFallbackCoordinator<S> {
    pub fn new(
        aggregator: AlarmCountAggregator<S>,
        channel_state: watch::Receiver<ChannelState>,
        config: PollConfig,
        parent: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(PollInner {
                aggregator,
                channel_state,
                config,
                parent,
                run: Mutex::new(None),
                next_generation: Mutex::new(0),
            }),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.lock_run().is_some()
    }

    /// Fetch now, then every `interval`. No-op if already polling.
    pub fn start(&self) {
        let mut run = self.inner.lock_run();
        if run.is_some() {
            return;
        }
        let generation = {
            let mut next = self
                .inner
                .next_generation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let cancel = self.inner.parent.child_token();
        *run = Some(PollRun {
            generation,
            cancel: cancel.clone(),
        });
        drop(run);

        info!("polling fallback started");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.poll_loop(generation, cancel).await;
        });
    }

    /// Stop polling. Idempotent.
    pub fn stop(&self) {
        if let Some(run) = self.inner.lock_run().take() {
            run.cancel.cancel();
            info!("polling fallback stopped");
        }
    }

    /// Watch channel transitions: a drop to Disconnected/Error arms the
    /// grace timer; reconnecting inside the grace period disarms it.
    pub fn spawn_supervisor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = self.clone();
        let mut state_rx = self.inner.channel_state.clone();
        let grace = self.inner.config.grace;

        tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;

            loop {
                let armed = deadline;
                let grace_timer = async move {
                    match armed {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *state_rx.borrow_and_update();
                        match state {
                            ChannelState::Disconnected | ChannelState::Error => {
                                if deadline.is_none() && !poller.is_polling() {
                                    debug!(state = %state, "stream down; arming grace timer");
                                    deadline = Some(Instant::now() + grace);
                                }
                            }
                            ChannelState::Connected | ChannelState::Idle => {
                                if deadline.take().is_some() {
                                    debug!(state = %state, "stream back within grace; resume cancelled");
                                }
                            }
                            ChannelState::Connecting => {}
                        }
                    }
                    () = grace_timer => {
                        deadline = None;
                        let live = *state_rx.borrow();
                        if is_down(live) {
                            info!(state = %live, "stream still down after grace; resuming polling");
                            poller.start();
                        }
                    }
                }
            }
        })
    }
}

impl<S: DataSource> PollInner<S> {
    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<PollRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_loop(&self, generation: u64, cancel: CancellationToken) {
        let started = Instant::now();
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = self.aggregator.refresh() => {}
        }

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let live = *self.channel_state.borrow();
                    if started.elapsed() >= self.config.warmup && live == ChannelState::Connected {
                        info!("push stream stable; polling fallback disabling itself");
                        self.finish(generation);
                        break;
                    }
                    let _ = self.aggregator.refresh().await;
                }
            }
        }
    }

    /// Clear the run slot if it still belongs to `generation`.
    fn finish(&self, generation: u64) {
        let mut run = self.lock_run();
        if run.as_ref().is_some_and(|r| r.generation == generation) {
            *run = None;
        }
    }
}
