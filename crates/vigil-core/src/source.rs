// ── Upstream data sources ──
//
// The engine reaches the platform only through these two traits so the
// scheduling logic can be exercised against scripted fakes. `ApiClient`
// and `WebSocketPush` are the production implementations.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use secrecy::SecretString;
use url::Url;

use vigil_api::ApiClient;

use crate::error::CoreError;
use crate::model::{ActiveAlarm, AlarmConfig, Group, Item, PushUpdate, SyncVersion};

/// Request/response endpoints the engine depends on.
///
/// An empty `item_ids` slice means "every item the caller may see".
pub trait DataSource: Send + Sync + 'static {
    fn fetch_version(&self) -> impl Future<Output = Result<SyncVersion, CoreError>> + Send;

    fn fetch_groups(&self) -> impl Future<Output = Result<Vec<Group>, CoreError>> + Send;

    fn fetch_items(
        &self,
        show_orphans: bool,
    ) -> impl Future<Output = Result<Vec<Item>, CoreError>> + Send;

    fn fetch_alarms(
        &self,
        item_ids: &[String],
    ) -> impl Future<Output = Result<Vec<AlarmConfig>, CoreError>> + Send;

    /// Permission-filtered list of raised alarms.
    fn fetch_active_alarms(
        &self,
        item_ids: &[String],
    ) -> impl Future<Output = Result<Vec<ActiveAlarm>, CoreError>> + Send;
}

/// A live push subscription.
pub type PushUpdateStream = Pin<Box<dyn Stream<Item = Result<PushUpdate, CoreError>> + Send>>;

/// Opens one push subscription. Reconnection is the caller's job.
pub trait PushSource: Send + Sync + 'static {
    fn open(
        &self,
        client_id: &str,
        token: &SecretString,
    ) -> impl Future<Output = Result<PushUpdateStream, CoreError>> + Send;
}

// ── HTTP implementation ──────────────────────────────────────────────

impl DataSource for ApiClient {
    async fn fetch_version(&self) -> Result<SyncVersion, CoreError> {
        Ok(self.version().await?.into())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, CoreError> {
        Ok(self.groups().await?.into_iter().map(Group::from).collect())
    }

    async fn fetch_items(&self, show_orphans: bool) -> Result<Vec<Item>, CoreError> {
        Ok(self
            .items(show_orphans)
            .await?
            .into_iter()
            .map(Item::from)
            .collect())
    }

    async fn fetch_alarms(&self, item_ids: &[String]) -> Result<Vec<AlarmConfig>, CoreError> {
        Ok(self
            .alarms(item_ids)
            .await?
            .into_iter()
            .map(AlarmConfig::from)
            .collect())
    }

    async fn fetch_active_alarms(&self, item_ids: &[String]) -> Result<Vec<ActiveAlarm>, CoreError> {
        Ok(self
            .active_alarms(item_ids)
            .await?
            .into_iter()
            .map(ActiveAlarm::from)
            .collect())
    }
}

// ── WebSocket implementation ─────────────────────────────────────────

/// Push source backed by the platform's WebSocket alarm stream.
#[derive(Debug, Clone)]
pub struct WebSocketPush {
    url: Url,
    handshake_timeout: Duration,
}

impl WebSocketPush {
    /// `handshake_timeout` bounds the upgrade and nothing after it.
    pub fn new(url: Url, handshake_timeout: Duration) -> Self {
        Self {
            url,
            handshake_timeout,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl PushSource for WebSocketPush {
    async fn open(&self, client_id: &str, token: &SecretString) -> Result<PushUpdateStream, CoreError> {
        let frames = vigil_api::push::subscribe(&self.url, client_id, token, self.handshake_timeout).await?;
        let updates = frames.map(|frame| frame.map(PushUpdate::from).map_err(CoreError::from));
        Ok(Box::pin(updates))
    }
}
