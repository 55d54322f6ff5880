//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use vigil_config::ConfigError;
use vigil_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const STORAGE: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the platform at {url}")]
    #[diagnostic(
        code(vigil::connection_failed),
        help(
            "Check that the platform is running and reachable.\n\
             URL: {url}\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(vigil::timeout),
        help("Increase timeout with --timeout or check platform responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(vigil::auth_failed),
        help("The token was rejected or has expired. Supply a fresh one with --token or VIGIL_TOKEN.")
    )]
    AuthFailed { message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(vigil::no_credentials),
        help(
            "Pass --token, set VIGIL_TOKEN, store one in the system keyring\n\
             (service 'vigil', entry '{profile}/token'), or set token_env in the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Platform ─────────────────────────────────────────────────────

    #[error("API error: {message}")]
    #[diagnostic(code(vigil::api_error))]
    Api { message: String },

    #[error("Sync failed: {message}")]
    #[diagnostic(
        code(vigil::sync_failed),
        help("Phases committed before the failure are kept. Re-run `vigil sync` to retry.")
    )]
    SyncFailed { message: String },

    // ── Local state ──────────────────────────────────────────────────

    #[error("Snapshot store error: {message}")]
    #[diagnostic(
        code(vigil::storage),
        help("Check that the data directory is writable, or pick another with --data-dir.")
    )]
    Storage { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vigil::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(vigil::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Or pass the platform URL directly with --url."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No platform configured")]
    #[diagnostic(
        code(vigil::no_config),
        help(
            "Pass --url (or VIGIL_URL), or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(vigil::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Storage { .. } => exit_code::STORAGE,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::MissingCredentials => CliError::AuthFailed {
                message: "no credential available".into(),
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Storage { key, message } => CliError::Storage {
                message: format!("{key}: {message}"),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Api { message, status } => CliError::Api {
                message: match status {
                    Some(code) => format!("{message} (HTTP {code})"),
                    None => message,
                },
            },
            other @ (CoreError::Stream { .. }
            | CoreError::Serialization(_)
            | CoreError::SyncInProgress
            | CoreError::Internal(_)) => CliError::Api {
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            other => CliError::Config(Box::new(other)),
        }
    }
}
