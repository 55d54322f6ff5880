// ── Cross-instance message bus ──
//
// Login state changes are replicated between instances by writing a
// message envelope to a dedicated backend key. Every instance sharing the
// backend sees the write as a storage event; the writer ignores its own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::store::{BUS_KEY, StorageBackend, StorageEvent, TabId};

/// A replicated session change, with just enough payload to apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabMessage {
    Login {
        token: String,
        #[serde(default)]
        user: Option<String>,
    },
    Logout,
    TokenRefreshed {
        token: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    from: TabId,
    /// Makes every write distinct, so repeating a message still changes
    /// the stored value.
    nonce: Uuid,
    message: TabMessage,
}

pub struct TabBus {
    backend: Arc<dyn StorageBackend>,
    tab_id: TabId,
}

impl TabBus {
    pub fn new(backend: Arc<dyn StorageBackend>, tab_id: TabId) -> Self {
        Self { backend, tab_id }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn publish(&self, message: TabMessage) -> Result<(), CoreError> {
        let envelope = Envelope {
            from: self.tab_id,
            nonce: Uuid::new_v4(),
            message,
        };
        let json = serde_json::to_string(&envelope)?;
        self.backend.set(BUS_KEY, &json, self.tab_id)?;
        debug!(tab = %self.tab_id, "bus message published");
        Ok(())
    }

    /// Messages from other instances, from now on.
    pub fn subscribe(&self) -> TabReceiver {
        TabReceiver {
            rx: self.backend.subscribe(),
            tab_id: self.tab_id,
        }
    }
}

pub struct TabReceiver {
    rx: broadcast::Receiver<StorageEvent>,
    tab_id: TabId,
}

impl TabReceiver {
    /// Next message from another instance; `None` once the backend is gone.
    pub async fn recv(&mut self) -> Option<TabMessage> {
        loop {
            let event = match self.rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "bus receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            if let Some(message) = self.accept(&event) {
                return Some(message);
            }
        }
    }

    fn accept(&self, event: &StorageEvent) -> Option<TabMessage> {
        if event.key != BUS_KEY || event.origin == Some(self.tab_id) {
            return None;
        }
        let raw = event.new_value.as_deref()?;
        match serde_json::from_str::<Envelope>(raw) {
            // File watchers cannot tag origin; the envelope can.
            Ok(envelope) if envelope.from == self.tab_id => None,
            Ok(envelope) => Some(envelope.message),
            Err(e) => {
                warn!(error = %e, "ignoring malformed bus message");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    #[test]
    fn wire_names_match_broadcast_contract() {
        let json = serde_json::to_value(TabMessage::TokenRefreshed { token: "t".into() }).unwrap();
        assert_eq!(json["type"], "TOKEN_REFRESHED");
        let json = serde_json::to_value(TabMessage::Logout).unwrap();
        assert_eq!(json["type"], "LOGOUT");
    }

    #[tokio::test]
    async fn other_tabs_receive_and_sender_does_not() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let a = TabBus::new(Arc::clone(&backend), TabId::new());
        let b = TabBus::new(Arc::clone(&backend), TabId::new());
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.publish(TabMessage::Logout).unwrap();
        b.publish(TabMessage::TokenRefreshed { token: "n".into() }).unwrap();

        assert_eq!(b_rx.recv().await, Some(TabMessage::Logout));
        assert_eq!(
            a_rx.recv().await,
            Some(TabMessage::TokenRefreshed { token: "n".into() })
        );
    }
}
