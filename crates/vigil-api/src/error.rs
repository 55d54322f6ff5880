use thiserror::Error;

/// Top-level error type for the `vigil-api` crate.
///
/// Covers every failure mode across the HTTP endpoints and the push
/// stream. `vigil-core` maps these into domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server rejected the bearer token (HTTP 401/403 or a refused
    /// stream handshake).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// No credential is available to attach to the request.
    #[error("No credential available for this request")]
    MissingCredential,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── API ─────────────────────────────────────────────────────────
    /// Non-success HTTP status with whatever message the server sent.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Push stream ─────────────────────────────────────────────────
    /// Push stream connection or read failed.
    #[error("Push stream connection failed: {0}")]
    StreamConnect(String),

    /// Push stream closed by the server with a close frame.
    #[error("Push stream closed (code {code}): {reason}")]
    StreamClosed { code: u16, reason: String },

    /// A stream frame did not have the expected shape.
    #[error("Invalid push frame: {0}")]
    InvalidFrame(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the failure is about credentials rather than
    /// the network. Retrying will not help until the credential changes.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::MissingCredential)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Timeout { .. } | Self::StreamConnect(_) | Self::StreamClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}
