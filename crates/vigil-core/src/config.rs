// ── Runtime engine configuration ──
//
// These types describe *how* the sync engine talks to the platform and
// how its timers are tuned. They carry no file I/O: the CLI builds an
// `EngineConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed plant servers).
    DangerAcceptInvalid,
}

/// Push-stream reconnection policy.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Delay before reconnecting after a clean transport close.
    pub reconnect_delay: Duration,
    /// First backoff delay after an error.
    pub backoff_base: Duration,
    /// Upper bound on the backoff delay.
    pub backoff_cap: Duration,
    /// Consecutive failures after which automatic reconnection stops.
    pub max_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

/// Polling fallback tuning.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Polling keeps running at least this long after `start()`.
    pub warmup: Duration,
    /// How long the stream must stay down before polling resumes.
    pub grace: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            warmup: Duration::from_secs(60),
            grace: Duration::from_secs(5),
        }
    }
}

/// Background staleness refresh and per-entity retry tuning.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How often the staleness check runs while visible.
    pub check_interval: Duration,
    /// Snapshots older than this are refetched.
    pub stale_threshold: Duration,
    /// Attempts per entity type, including the first one.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base: Duration,
    pub retry_cap: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5 * 60),
            stale_threshold: Duration::from_secs(30 * 60),
            max_attempts: 3,
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(8),
        }
    }
}

/// Every timer the engine runs, grouped by component.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub stream: StreamConfig,
    pub poll: PollConfig,
    pub refresh: RefreshConfig,
    /// TTL stamped on every stored snapshot.
    pub snapshot_ttl: Duration,
    /// TTL of read-through response cache entries.
    pub cache_ttl: Duration,
    /// Include items without a group in the Items phase.
    pub show_orphans: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            poll: PollConfig::default(),
            refresh: RefreshConfig::default(),
            snapshot_ttl: Duration::from_secs(30 * 60),
            cache_ttl: Duration::from_secs(60),
            show_orphans: true,
        }
    }
}

/// Configuration for one engine instance.
///
/// Built by CLI/config layer, passed to the engine -- core never reads
/// config files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Platform base URL (e.g., `https://scada.plant.local`).
    pub api_url: Url,
    /// Push-stream WebSocket URL.
    pub stream_url: Url,
    /// Identifies this client on the push stream.
    pub client_id: String,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Directory for the persistent snapshot store. `None` keeps
    /// everything in memory.
    pub data_dir: Option<PathBuf>,
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Config with default tuning for the given endpoints.
    pub fn new(api_url: Url, stream_url: Url, client_id: impl Into<String>) -> Self {
        Self {
            api_url,
            stream_url,
            client_id: client_id.into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            data_dir: None,
            sync: SyncConfig::default(),
        }
    }

    /// Derive the push-stream URL from an API base URL:
    /// `https://host/x` → `wss://host/x/api/v1/alarms/stream`.
    pub fn default_stream_url(api_url: &Url) -> Result<Url, url::ParseError> {
        let scheme = if api_url.scheme() == "https" { "wss" } else { "ws" };
        let host = api_url.host_str().unwrap_or("localhost");
        let path = api_url.path().trim_end_matches('/');
        let path = path.strip_suffix("/api/v1").unwrap_or(path);
        let raw = match api_url.port() {
            Some(p) => format!("{scheme}://{host}:{p}{path}/api/v1/alarms/stream"),
            None => format!("{scheme}://{host}{path}/api/v1/alarms/stream"),
        };
        Url::parse(&raw)
    }
}
