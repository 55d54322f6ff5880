// Async HTTP client for the platform's sync endpoints.
//
// Base path: {base}/api/v1/
// Auth: `Authorization: Bearer <token>` read from the shared TokenCell on
// every request, so a token refresh takes effect without rebuilding.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::TokenCell;
use crate::error::Error;
use crate::models::{
    ActiveAlarmRecord, AlarmRecord, GroupRecord, ItemRecord, ItemScope, VersionResponse,
};
use crate::transport::TransportConfig;

// ── Response envelopes ───────────────────────────────────────────────

/// Collections come back either as a bare array or wrapped in `{ data }`.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(v) | Self::Wrapped { data: v } => v,
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the version, bulk and active-alarm endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Arc<TokenCell>,
}

impl ApiClient {
    /// Build from a base URL, transport config, and shared credential cell.
    pub fn new(base_url: &str, transport: &TransportConfig, token: Arc<TokenCell>) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http, token)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client, token: Arc<TokenCell>) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Ensure the base URL ends with `/api/v1/` so relative joins work.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        if path.ends_with("/api/v1") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/api/v1/"));
        }
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &Arc<TokenCell> {
        &self.token
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Current configuration generation for this user.
    pub async fn version(&self) -> Result<VersionResponse, Error> {
        self.get("sync/version", &[]).await
    }

    pub async fn groups(&self) -> Result<Vec<GroupRecord>, Error> {
        let listing: Listing<GroupRecord> = self.get("groups", &[]).await?;
        Ok(listing.into_vec())
    }

    /// Items visible to the caller. `show_orphans` includes items with no group.
    pub async fn items(&self, show_orphans: bool) -> Result<Vec<ItemRecord>, Error> {
        let params = [("showOrphans", show_orphans.to_string())];
        let listing: Listing<ItemRecord> = self.get("items", &params).await?;
        Ok(listing.into_vec())
    }

    /// Alarm configurations for the given items. Empty means all permitted.
    pub async fn alarms(&self, item_ids: &[String]) -> Result<Vec<AlarmRecord>, Error> {
        let listing: Listing<AlarmRecord> =
            self.post("alarms/query", &ItemScope { item_ids }).await?;
        Ok(listing.into_vec())
    }

    /// Currently raised alarms, filtered by the caller's permissions and
    /// scoped to `item_ids` (empty means all permitted).
    pub async fn active_alarms(&self, item_ids: &[String]) -> Result<Vec<ActiveAlarmRecord>, Error> {
        let listing: Listing<ActiveAlarmRecord> =
            self.post("alarms/active", &ItemScope { item_ids }).await?;
        Ok(listing.into_vec())
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.token.bearer_header()?)
            .query(params)
            .send()
            .await?;
        handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.token.bearer_header()?)
            .json(body)
            .send()
            .await?;
        handle_response(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: error_message(&body).unwrap_or_else(|| status.to_string()),
        });
    }

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or(body),
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorResponse = serde_json::from_str(body).ok()?;
    parsed.message.or(parsed.error)
}
