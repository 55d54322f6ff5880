// ── Core error types ──
//
// Domain errors from vigil-core. Consumers never see HTTP status codes or
// JSON parse failures directly; the `From<vigil_api::Error>` impl
// translates transport-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach platform at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Not logged in: no credential available")]
    MissingCredentials,

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Push stream error: {message}")]
    Stream { message: String },

    // ── Local state ──────────────────────────────────────────────────
    #[error("Storage error on '{key}': {message}")]
    Storage { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("A sync is already in progress")]
    SyncInProgress,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transient failures are retried with backoff; everything else is
    /// surfaced immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Stream { .. } => true,
            Self::Api { status, .. } => {
                status.is_none_or(|s| s >= 500 || s == 429 || s == 408)
            }
            _ => false,
        }
    }

    /// Credential problems: fatal for the current attempt, retried only
    /// once the credential changes.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::MissingCredentials
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<vigil_api::Error> for CoreError {
    fn from(err: vigil_api::Error) -> Self {
        match err {
            vigil_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            vigil_api::Error::MissingCredential => CoreError::MissingCredentials,
            vigil_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() || e.is_request() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            vigil_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            vigil_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            vigil_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            vigil_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            vigil_api::Error::StreamConnect(reason) => CoreError::Stream { message: reason },
            vigil_api::Error::StreamClosed { code, reason } => CoreError::Stream {
                message: format!("closed (code {code}): {reason}"),
            },
            vigil_api::Error::InvalidFrame(msg) => CoreError::Api {
                message: format!("invalid push frame: {msg}"),
                status: None,
            },
            vigil_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_auth_maps_to_auth_failure() {
        let err: CoreError = vigil_api::Error::Authentication {
            message: "expired".into(),
        }
        .into();
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_error_stays_transient() {
        let err: CoreError = vigil_api::Error::Api {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn stream_errors_are_transient() {
        let err: CoreError = vigil_api::Error::StreamConnect("reset".into()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn bad_request_is_final() {
        let err: CoreError = vigil_api::Error::Api {
            status: 422,
            message: "bad scope".into(),
        }
        .into();
        assert!(!err.is_transient());
    }
}
