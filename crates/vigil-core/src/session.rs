// ── Session ──
//
// Login state shared by every component: the credential cell, an
// `authenticated` watch, and replication of login/logout/token refresh to
// other instances. Remote messages are applied locally without being
// re-broadcast.

use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_api::TokenCell;

use crate::error::CoreError;
use crate::store::SnapshotStore;
use crate::tabs::{TabBus, TabMessage};

pub struct Session {
    token: Arc<TokenCell>,
    store: Arc<SnapshotStore>,
    bus: TabBus,
    user: Mutex<Option<String>>,
    authenticated: watch::Sender<bool>,
}

impl Session {
    /// A session starts authenticated if `token` already holds a credential.
    pub fn new(token: Arc<TokenCell>, store: Arc<SnapshotStore>) -> Self {
        let bus = TabBus::new(Arc::clone(store.backend()), store.tab_id());
        let (authenticated, _) = watch::channel(token.is_present());
        Self {
            token,
            store,
            bus,
            user: Mutex::new(None),
            authenticated,
        }
    }

    pub fn token(&self) -> &Arc<TokenCell> {
        &self.token
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    pub fn subscribe_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    pub fn user(&self) -> Option<String> {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Local actions (replicated) ───────────────────────────────────

    pub fn login(&self, token: SecretString, user: Option<String>) -> Result<(), CoreError> {
        let wire = token.expose_secret().to_owned();
        self.apply_login(token, user.clone());
        self.bus.publish(TabMessage::Login { token: wire, user })
    }

    pub fn refresh_token(&self, token: SecretString) -> Result<(), CoreError> {
        let wire = token.expose_secret().to_owned();
        self.token.set(token);
        info!("token refreshed");
        self.bus.publish(TabMessage::TokenRefreshed { token: wire })
    }

    /// Drop the credential and every persisted snapshot, locally and in
    /// all other instances.
    pub fn logout(&self) -> Result<(), CoreError> {
        self.apply_logout();
        let cleared = self.store.clear();
        let published = self.bus.publish(TabMessage::Logout);
        cleared.and(published)
    }

    // ── Remote messages ──────────────────────────────────────────────

    pub fn apply_remote(&self, message: TabMessage) {
        match message {
            TabMessage::Login { token, user } => {
                info!("login replicated from another instance");
                self.apply_login(SecretString::from(token), user);
            }
            TabMessage::TokenRefreshed { token } => {
                info!("token refresh replicated from another instance");
                self.token.set(SecretString::from(token));
            }
            TabMessage::Logout => {
                info!("logout replicated from another instance");
                self.apply_logout();
                // The sender already cleared the shared backend; this only
                // resets our in-memory view.
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "failed to clear store after remote logout");
                }
            }
        }
    }

    /// Apply messages from other instances until cancelled.
    pub fn spawn_listener(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.spawn_listener_with(cancel, || async {})
    }

    /// As [`spawn_listener`](Self::spawn_listener), awaiting `before_logout`
    /// ahead of applying a remote logout so session work can stop before
    /// the store is cleared.
    pub fn spawn_listener_with<F, Fut>(
        self: &Arc<Self>,
        cancel: CancellationToken,
        before_logout: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut rx = self.bus.subscribe();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    message = rx.recv() => match message {
                        Some(TabMessage::Logout) => {
                            before_logout().await;
                            session.apply_remote(TabMessage::Logout);
                        }
                        Some(message) => session.apply_remote(message),
                        None => break,
                    }
                }
            }
        })
    }

    fn apply_login(&self, token: SecretString, user: Option<String>) {
        self.token.set(token);
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user;
        self.authenticated.send_replace(true);
        info!("logged in");
    }

    fn apply_logout(&self) {
        self.token.clear();
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.authenticated.send_replace(false);
        info!("logged out");
    }
}
